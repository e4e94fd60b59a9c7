use std::{sync::Arc, time::SystemTime};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        match_store::MatchStore,
        models::{
            ContactRequestEntity, ContactRequestStatus, PendingKey, ProfileKind,
            ProfileVisibility, TargetProfile, UserRole,
        },
    },
    dto::{
        contact_request::{
            ContactRequestSummary, ContactRequestView, GameSummary, PartySummary,
            RequestDirection, TargetSummary,
        },
        validation::{MAX_MESSAGE_LENGTH, normalize_optional_text},
    },
    error::ServiceError,
    state::SharedState,
};

const UNKNOWN_PARTY: &str = "Unknown";

/// Send a contact request from `requester_id` to the owner of `target`.
///
/// Checks run in a fixed order so callers get a stable error for a given input:
/// message length, requester, game, target profile (missing or private both
/// read as not found), self-contact, then an already pending request.
pub async fn create(
    state: &SharedState,
    requester_id: Uuid,
    target: TargetProfile,
    game_id: Uuid,
    message: Option<String>,
) -> Result<ContactRequestSummary, ServiceError> {
    let message = normalize_optional_text(message);
    if let Some(text) = &message {
        if text.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(ServiceError::InvalidInput(format!(
                "message must be at most {MAX_MESSAGE_LENGTH} characters"
            )));
        }
    }

    let store = state.require_store().await?;

    store
        .find_user(requester_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("user `{requester_id}` not found")))?;
    let game = store
        .find_game(game_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` not found")))?;

    let (recipient_id, target_summary) = resolve_public_target(&store, target).await?;
    if recipient_id == requester_id {
        return Err(ServiceError::InvalidInput("cannot contact self".into()));
    }

    let key = PendingKey {
        requester_user_id: requester_id,
        recipient_user_id: recipient_id,
        target,
        game_id,
    };
    if store.find_pending_contact_request(key).await?.is_some() {
        return Err(ServiceError::Conflict(
            "a pending contact request already exists for this profile and game".into(),
        ));
    }

    let request = ContactRequestEntity::pending(key, message, SystemTime::now());
    store.insert_contact_request(request.clone()).await?;
    info!(
        request_id = %request.id,
        requester_id = %requester_id,
        recipient_id = %recipient_id,
        target = ?target.kind(),
        "contact request created"
    );

    let other_party = describe_party(&store, recipient_id).await?;
    Ok(ContactRequestSummary::new(
        request,
        RequestDirection::Outgoing,
        other_party,
        target_summary,
        Some(GameSummary::from(game)),
    ))
}

/// Requests addressed to `user_id`, newest first.
pub async fn list_incoming(
    state: &SharedState,
    user_id: Uuid,
) -> Result<Vec<ContactRequestSummary>, ServiceError> {
    let store = state.require_store().await?;
    let requests = store.list_contact_requests_by_recipient(user_id).await?;
    summarize_all(&store, requests, RequestDirection::Incoming).await
}

/// Requests sent by `user_id`, newest first.
pub async fn list_outgoing(
    state: &SharedState,
    user_id: Uuid,
) -> Result<Vec<ContactRequestSummary>, ServiceError> {
    let store = state.require_store().await?;
    let requests = store.list_contact_requests_by_requester(user_id).await?;
    summarize_all(&store, requests, RequestDirection::Outgoing).await
}

/// Accept or reject a request as its recipient.
///
/// Accepted and rejected are final: repeating the current status succeeds
/// without changes, switching to the other one is a conflict. Acceptance
/// makes sure the conversation exists and reports its id.
pub async fn update_status(
    state: &SharedState,
    actor_id: Uuid,
    request_id: Uuid,
    status: ContactRequestStatus,
) -> Result<ContactRequestView, ServiceError> {
    let store = state.require_store().await?;
    let request = find_request(&store, request_id).await?;

    if request.recipient_user_id != actor_id {
        warn!(
            request_id = %request_id,
            user_id = %actor_id,
            "status change refused: caller is not the recipient"
        );
        return Err(ServiceError::Forbidden(
            "only the recipient can change the status of a contact request".into(),
        ));
    }
    if !status.is_terminal() {
        return Err(ServiceError::InvalidInput(
            "status must be ACCEPTED or REJECTED".into(),
        ));
    }

    let request = if request.status == ContactRequestStatus::Pending {
        match store
            .transition_pending_contact_request(request_id, status, SystemTime::now())
            .await?
        {
            Some(updated) => {
                info!(
                    request_id = %request_id,
                    status = status.as_str(),
                    "contact request resolved"
                );
                updated
            }
            // Lost a race against another writer; judge against the fresh row.
            None => find_request(&store, request_id).await?,
        }
    } else {
        request
    };

    if request.status != status {
        return Err(ServiceError::Conflict(format!(
            "contact request is already {}",
            request.status.as_str()
        )));
    }

    let conversation_id = if request.status == ContactRequestStatus::Accepted {
        let conversation = store
            .ensure_conversation(request.id, request.updated_at)
            .await?;
        Some(conversation.id)
    } else {
        None
    };

    Ok(ContactRequestView::new(request, conversation_id))
}

/// Withdraw a still pending request as its requester.
pub async fn withdraw(
    state: &SharedState,
    actor_id: Uuid,
    request_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let request = find_request(&store, request_id).await?;

    if request.requester_user_id != actor_id {
        warn!(
            request_id = %request_id,
            user_id = %actor_id,
            "withdrawal refused: caller is not the requester"
        );
        return Err(ServiceError::Forbidden(
            "only the requester can withdraw a contact request".into(),
        ));
    }
    if request.status != ContactRequestStatus::Pending {
        return Err(not_pending(request.status));
    }

    if store.delete_pending_contact_request(request_id).await? {
        info!(request_id = %request_id, "contact request withdrawn");
        return Ok(());
    }

    // The conditional delete missed: the request was resolved or removed meanwhile.
    let current = find_request(&store, request_id).await?;
    Err(not_pending(current.status))
}

fn not_pending(status: ContactRequestStatus) -> ServiceError {
    ServiceError::InvalidInput(format!(
        "only pending contact requests can be withdrawn (current status {})",
        status.as_str()
    ))
}

async fn find_request(
    store: &Arc<dyn MatchStore>,
    request_id: Uuid,
) -> Result<ContactRequestEntity, ServiceError> {
    store
        .find_contact_request(request_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("contact request `{request_id}` not found")))
}

/// Load a contactable profile and return its owner along with its label.
async fn resolve_public_target(
    store: &Arc<dyn MatchStore>,
    target: TargetProfile,
) -> Result<(Uuid, TargetSummary), ServiceError> {
    let not_found = || ServiceError::NotFound(format!("profile `{}` not found", target.profile_id()));
    match target {
        TargetProfile::Player(id) => {
            let profile = store
                .find_player_profile(id)
                .await?
                .filter(|profile| profile.visibility == ProfileVisibility::Public)
                .ok_or_else(not_found)?;
            Ok((
                profile.user_id,
                TargetSummary {
                    kind: ProfileKind::Player,
                    profile_id: id,
                    label: profile.display_name,
                },
            ))
        }
        TargetProfile::Team(id) => {
            let profile = store
                .find_team_profile(id)
                .await?
                .filter(|profile| profile.visibility == ProfileVisibility::Public)
                .ok_or_else(not_found)?;
            Ok((
                profile.owner_user_id,
                TargetSummary {
                    kind: ProfileKind::Team,
                    profile_id: id,
                    label: team_label(&profile.name, profile.tag.as_deref()),
                },
            ))
        }
    }
}

/// Label of a stored request's target, whatever its current visibility.
async fn describe_target(
    store: &Arc<dyn MatchStore>,
    target: TargetProfile,
) -> Result<TargetSummary, ServiceError> {
    let label = match target {
        TargetProfile::Player(id) => store
            .find_player_profile(id)
            .await?
            .map(|profile| profile.display_name),
        TargetProfile::Team(id) => store
            .find_team_profile(id)
            .await?
            .map(|profile| team_label(&profile.name, profile.tag.as_deref())),
    };
    Ok(TargetSummary {
        kind: target.kind(),
        profile_id: target.profile_id(),
        label: label.unwrap_or_else(|| UNKNOWN_PARTY.to_owned()),
    })
}

fn team_label(name: &str, tag: Option<&str>) -> String {
    match tag {
        Some(tag) if !tag.is_empty() => format!("{name} [{tag}]"),
        _ => name.to_owned(),
    }
}

/// Display identity of a user, picked from the profile matching their role.
pub(crate) async fn describe_party(
    store: &Arc<dyn MatchStore>,
    user_id: Uuid,
) -> Result<PartySummary, ServiceError> {
    let unresolved = |kind: Option<ProfileKind>, name: &str| PartySummary {
        user_id,
        kind,
        profile_id: None,
        name: name.to_owned(),
        tag: None,
    };

    let Some(user) = store.find_user(user_id).await? else {
        return Ok(unresolved(None, UNKNOWN_PARTY));
    };

    let party = match user.role {
        UserRole::Player => match store.find_player_profile_by_user(user_id).await? {
            Some(profile) => PartySummary {
                user_id,
                kind: Some(ProfileKind::Player),
                profile_id: Some(profile.id),
                name: profile.display_name,
                tag: None,
            },
            None => unresolved(Some(ProfileKind::Player), "Player"),
        },
        UserRole::Team => match store.find_team_profile_by_owner(user_id).await? {
            Some(profile) => PartySummary {
                user_id,
                kind: Some(ProfileKind::Team),
                profile_id: Some(profile.id),
                name: profile.name,
                tag: profile.tag,
            },
            None => unresolved(Some(ProfileKind::Team), "Team"),
        },
    };
    Ok(party)
}

async fn summarize_all(
    store: &Arc<dyn MatchStore>,
    requests: Vec<ContactRequestEntity>,
    direction: RequestDirection,
) -> Result<Vec<ContactRequestSummary>, ServiceError> {
    let mut summaries = Vec::with_capacity(requests.len());
    for request in requests {
        let other_id = match direction {
            RequestDirection::Incoming => request.requester_user_id,
            RequestDirection::Outgoing => request.recipient_user_id,
        };
        let other_party = describe_party(store, other_id).await?;
        let Some(target) = request.target() else {
            warn!(request_id = %request.id, "skipping contact request without a single target");
            continue;
        };
        let target = describe_target(store, target).await?;
        let game = store.find_game(request.game_id).await?.map(GameSummary::from);
        summaries.push(ContactRequestSummary::new(
            request,
            direction,
            other_party,
            target,
            game,
        ));
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::Fixture;

    #[tokio::test]
    async fn create_persists_a_pending_request_for_the_profile_owner() {
        let fx = Fixture::new().await;
        let summary = create(
            &fx.state,
            fx.player.user_id,
            TargetProfile::Team(fx.team.id),
            fx.game.id,
            Some("Looking for a jungler?".into()),
        )
        .await
        .unwrap();

        assert_eq!(summary.status, ContactRequestStatus::Pending);
        assert_eq!(summary.direction, RequestDirection::Outgoing);
        assert_eq!(summary.other_party.user_id, fx.team.owner_user_id);
        assert_eq!(summary.other_party.name, "Karmine Corp");
        assert_eq!(summary.other_party.tag.as_deref(), Some("KC"));
        assert_eq!(summary.target.label, "Karmine Corp [KC]");

        let stored = fx
            .store
            .find_contact_request(summary.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.target_team_id, Some(fx.team.id));
        assert_eq!(stored.target_player_id, None);
        assert_eq!(stored.recipient_user_id, fx.team.owner_user_id);
    }

    #[tokio::test]
    async fn create_checks_run_in_order() {
        let fx = Fixture::new().await;
        let too_long = Some("x".repeat(MAX_MESSAGE_LENGTH + 1));
        let err = create(
            &fx.state,
            Uuid::new_v4(),
            TargetProfile::Team(fx.team.id),
            fx.game.id,
            too_long,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let err = create(
            &fx.state,
            Uuid::new_v4(),
            TargetProfile::Team(fx.team.id),
            fx.game.id,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = create(
            &fx.state,
            fx.player.user_id,
            TargetProfile::Team(fx.team.id),
            Uuid::new_v4(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn private_and_missing_profiles_are_not_found() {
        let fx = Fixture::new().await;
        for target in [
            TargetProfile::Player(fx.private_player.id),
            TargetProfile::Player(Uuid::new_v4()),
            TargetProfile::Team(Uuid::new_v4()),
        ] {
            let err = create(&fx.state, fx.team.owner_user_id, target, fx.game.id, None)
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::NotFound(_)), "{target:?}");
        }
    }

    #[tokio::test]
    async fn contacting_own_profile_is_invalid() {
        let fx = Fixture::new().await;
        let err = create(
            &fx.state,
            fx.player.user_id,
            TargetProfile::Player(fx.player.id),
            fx.game.id,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(ref m) if m == "cannot contact self"));
    }

    #[tokio::test]
    async fn duplicate_pending_request_conflicts_until_resolved() {
        let fx = Fixture::new().await;
        let target = TargetProfile::Team(fx.team.id);
        let first = create(&fx.state, fx.player.user_id, target, fx.game.id, None)
            .await
            .unwrap();

        let err = create(&fx.state, fx.player.user_id, target, fx.game.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // Another game is a different key.
        create(&fx.state, fx.player.user_id, target, fx.other_game.id, None)
            .await
            .unwrap();

        update_status(
            &fx.state,
            fx.team.owner_user_id,
            first.id,
            ContactRequestStatus::Rejected,
        )
        .await
        .unwrap();
        create(&fx.state, fx.player.user_id, target, fx.game.id, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn only_the_recipient_changes_status() {
        let fx = Fixture::new().await;
        let request = fx.pending_request().await;

        for actor in [fx.player.user_id, Uuid::new_v4()] {
            let err = update_status(&fx.state, actor, request.id, ContactRequestStatus::Accepted)
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Forbidden(_)));
        }
        let stored = fx
            .store
            .find_contact_request(request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ContactRequestStatus::Pending);

        let err = update_status(
            &fx.state,
            fx.team.owner_user_id,
            Uuid::new_v4(),
            ContactRequestStatus::Accepted,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn acceptance_is_idempotent_and_final() {
        let fx = Fixture::new().await;
        let request = fx.pending_request().await;
        let recipient = fx.team.owner_user_id;

        let err = update_status(&fx.state, recipient, request.id, ContactRequestStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let accepted = update_status(&fx.state, recipient, request.id, ContactRequestStatus::Accepted)
            .await
            .unwrap();
        let conversation_id = accepted.conversation_id.unwrap();
        assert_eq!(accepted.status, ContactRequestStatus::Accepted);

        let again = update_status(&fx.state, recipient, request.id, ContactRequestStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(again.conversation_id, Some(conversation_id));

        let err = update_status(&fx.state, recipient, request.id, ContactRequestStatus::Rejected)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn withdrawal_rules() {
        let fx = Fixture::new().await;
        let request = fx.pending_request().await;

        let err = withdraw(&fx.state, fx.team.owner_user_id, request.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        withdraw(&fx.state, fx.player.user_id, request.id)
            .await
            .unwrap();
        let err = withdraw(&fx.state, fx.player.user_id, request.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let accepted = fx.pending_request().await;
        update_status(
            &fx.state,
            fx.team.owner_user_id,
            accepted.id,
            ContactRequestStatus::Accepted,
        )
        .await
        .unwrap();
        let err = withdraw(&fx.state, fx.player.user_id, accepted.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn listings_describe_the_other_party() {
        let fx = Fixture::new().await;
        let request = fx.pending_request().await;

        let incoming = list_incoming(&fx.state, fx.team.owner_user_id).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].id, request.id);
        assert_eq!(incoming[0].direction, RequestDirection::Incoming);
        assert_eq!(incoming[0].other_party.name, "Faker");
        assert_eq!(incoming[0].other_party.kind, Some(ProfileKind::Player));

        let outgoing = list_outgoing(&fx.state, fx.player.user_id).await.unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].other_party.name, "Karmine Corp");
        assert_eq!(
            outgoing[0].game.as_ref().map(|game| game.code.as_str()),
            Some("LOL")
        );

        assert!(list_incoming(&fx.state, fx.player.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn degraded_mode_refuses_work() {
        let fx = Fixture::new().await;
        fx.state.update_degraded(true);
        let err = list_incoming(&fx.state, fx.player.user_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }
}
