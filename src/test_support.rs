use std::{sync::Arc, time::SystemTime};

use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        match_store::{MatchStore, memory::MemoryMatchStore},
        models::{
            ContactRequestStatus, GameEntity, PlayerProfileEntity, ProfileVisibility,
            TargetProfile, TeamProfileEntity, UserEntity, UserRole,
        },
    },
    dto::contact_request::ContactRequestSummary,
    services::contact_request_service,
    state::{AppState, SharedState},
};

/// A seeded directory: one public player, one private player, one public team, two games.
pub struct Fixture {
    pub state: SharedState,
    pub store: Arc<dyn MatchStore>,
    pub player: PlayerProfileEntity,
    pub private_player: PlayerProfileEntity,
    pub team: TeamProfileEntity,
    pub game: GameEntity,
    pub other_game: GameEntity,
}

impl Fixture {
    pub async fn new() -> Self {
        let store: Arc<dyn MatchStore> = Arc::new(MemoryMatchStore::new());
        let now = SystemTime::now();

        let player = PlayerProfileEntity {
            id: Uuid::new_v4(),
            user_id: user(&store, UserRole::Player, "faker@example.gg").await,
            display_name: "Faker".into(),
            region: Some("KR".into()),
            visibility: ProfileVisibility::Public,
            created_at: now,
        };
        let private_player = PlayerProfileEntity {
            id: Uuid::new_v4(),
            user_id: user(&store, UserRole::Player, "ghost@example.gg").await,
            display_name: "Ghost".into(),
            region: None,
            visibility: ProfileVisibility::Private,
            created_at: now,
        };
        let team = TeamProfileEntity {
            id: Uuid::new_v4(),
            owner_user_id: user(&store, UserRole::Team, "manager@kcorp.gg").await,
            name: "Karmine Corp".into(),
            tag: Some("KC".into()),
            region: Some("EUW".into()),
            visibility: ProfileVisibility::Public,
            created_at: now,
        };
        let game = GameEntity {
            id: Uuid::new_v4(),
            name: "League of Legends".into(),
            code: "LOL".into(),
        };
        let other_game = GameEntity {
            id: Uuid::new_v4(),
            name: "Valorant".into(),
            code: "VALORANT".into(),
        };

        store.save_player_profile(player.clone()).await.unwrap();
        store.save_player_profile(private_player.clone()).await.unwrap();
        store.save_team_profile(team.clone()).await.unwrap();
        store.save_game(game.clone()).await.unwrap();
        store.save_game(other_game.clone()).await.unwrap();

        Self {
            state: AppState::with_store(AppConfig::default(), store.clone()),
            store,
            player,
            private_player,
            team,
            game,
            other_game,
        }
    }

    /// The public player asks the team to connect for the main game.
    pub async fn pending_request(&self) -> ContactRequestSummary {
        contact_request_service::create(
            &self.state,
            self.player.user_id,
            TargetProfile::Team(self.team.id),
            self.game.id,
            Some("Looking for a mid laner?".into()),
        )
        .await
        .unwrap()
    }

    /// Accept a fresh request and return the conversation it opened.
    pub async fn accepted_conversation(&self) -> Uuid {
        let request = self.pending_request().await;
        contact_request_service::update_status(
            &self.state,
            self.team.owner_user_id,
            request.id,
            ContactRequestStatus::Accepted,
        )
        .await
        .unwrap()
        .conversation_id
        .unwrap()
    }
}

async fn user(store: &Arc<dyn MatchStore>, role: UserRole, email: &str) -> Uuid {
    let id = Uuid::new_v4();
    store
        .save_user(UserEntity {
            id,
            email: email.into(),
            role,
            created_at: SystemTime::now(),
        })
        .await
        .unwrap();
    id
}
