//! Optional directory seeding from a JSON file.

use std::{env, fs, path::PathBuf, sync::Arc, time::SystemTime};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{
        GameEntity, PlayerProfileEntity, ProfileVisibility, TeamProfileEntity, UserEntity,
        UserRole,
    },
    storage::StorageError,
};

/// Environment variable pointing at the seed file. Seeding is skipped when unset.
pub const SEED_PATH_ENV: &str = "TEAMFINDER_BACK_SEED_PATH";

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse seed file `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to store seed data")]
    Storage(#[from] StorageError),
}

/// Directory records to upsert, keyed by their ids.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeedData {
    pub users: Vec<SeedUser>,
    pub player_profiles: Vec<SeedPlayerProfile>,
    pub team_profiles: Vec<SeedTeamProfile>,
    pub games: Vec<SeedGame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedPlayerProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "public")]
    pub visibility: ProfileVisibility,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedTeamProfile {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "public")]
    pub visibility: ProfileVisibility,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedGame {
    pub id: Uuid,
    pub name: String,
    pub code: String,
}

fn public() -> ProfileVisibility {
    ProfileVisibility::Public
}

impl SeedData {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Read the file named by [`SEED_PATH_ENV`], if any.
    pub fn from_env() -> Result<Option<Self>, SeedError> {
        let Some(path) = env::var_os(SEED_PATH_ENV).map(PathBuf::from) else {
            return Ok(None);
        };
        let raw = fs::read_to_string(&path).map_err(|source| SeedError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_json_str(&raw)
            .map(Some)
            .map_err(|source| SeedError::Parse { path, source })
    }
}

/// Upsert every seed record. Running it twice leaves the store unchanged.
pub async fn apply(store: &Arc<dyn MatchStore>, seed: &SeedData) -> Result<(), SeedError> {
    let now = SystemTime::now();

    for user in &seed.users {
        store
            .save_user(UserEntity {
                id: user.id,
                email: user.email.clone(),
                role: user.role,
                created_at: now,
            })
            .await?;
    }
    for profile in &seed.player_profiles {
        store
            .save_player_profile(PlayerProfileEntity {
                id: profile.id,
                user_id: profile.user_id,
                display_name: profile.display_name.clone(),
                region: profile.region.clone(),
                visibility: profile.visibility,
                created_at: now,
            })
            .await?;
    }
    for profile in &seed.team_profiles {
        store
            .save_team_profile(TeamProfileEntity {
                id: profile.id,
                owner_user_id: profile.owner_user_id,
                name: profile.name.clone(),
                tag: profile.tag.clone(),
                region: profile.region.clone(),
                visibility: profile.visibility,
                created_at: now,
            })
            .await?;
    }
    for game in &seed.games {
        store
            .save_game(GameEntity {
                id: game.id,
                name: game.name.clone(),
                code: game.code.clone(),
            })
            .await?;
    }

    info!(
        users = seed.users.len(),
        player_profiles = seed.player_profiles.len(),
        team_profiles = seed.team_profiles.len(),
        games = seed.games.len(),
        "seed data applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::match_store::memory::MemoryMatchStore;

    #[tokio::test]
    async fn seed_file_populates_the_directory() {
        let user = Uuid::new_v4();
        let profile = Uuid::new_v4();
        let game = Uuid::new_v4();
        let raw = serde_json::json!({
            "users": [{ "id": user, "email": "mid@example.gg", "role": "PLAYER" }],
            "playerProfiles": [{ "id": profile, "userId": user, "displayName": "Caps" }],
            "games": [{ "id": game, "name": "League of Legends", "code": "LOL" }],
        })
        .to_string();
        let seed = SeedData::from_json_str(&raw).unwrap();
        assert!(seed.team_profiles.is_empty());

        let store: Arc<dyn MatchStore> = Arc::new(MemoryMatchStore::new());
        apply(&store, &seed).await.unwrap();
        apply(&store, &seed).await.unwrap();

        let stored = store.find_player_profile_by_user(user).await.unwrap().unwrap();
        assert_eq!(stored.id, profile);
        assert_eq!(stored.visibility, ProfileVisibility::Public);
        assert_eq!(store.find_game(game).await.unwrap().unwrap().code, "LOL");
    }

    #[test]
    fn unknown_role_is_a_parse_error() {
        let raw = r#"{"users":[{"id":"6f1c1c38-8a57-4f43-9a51-1f0c5a6fd2a4","email":"x","role":"ADMIN"}]}"#;
        assert!(SeedData::from_json_str(raw).is_err());
    }
}
