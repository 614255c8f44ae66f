//! End-to-end tests of the messaging core against an in-memory database:
//! conversation lifecycle, request gating, both encryption schemes,
//! ordering, reactions, tombstones, read cursors and admin continuity.

use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use agora_core::{
    ConversationRegistry, CoreError, DbKeyStore, GroupAdministration, MessagingService,
    ReactionChange,
};
use agora_crypto::keys::{self, KeyStore};
use agora_crypto::{OaepEngine, UNDECRYPTABLE_PLACEHOLDER};
use agora_db::Database;
use agora_gateway::DeliveryChannel;
use agora_types::models::ConversationKind;

/// RSA generation is expensive in debug builds; tests draw key material
/// from a shared pool of pre-generated PEM pairs.
fn pem_pool() -> &'static Vec<(String, String)> {
    static POOL: OnceLock<Vec<(String, String)>> = OnceLock::new();
    POOL.get_or_init(|| {
        (0..3)
            .map(|_| {
                let pair = keys::generate(Uuid::new_v4()).expect("test key generation");
                (
                    keys::public_key_to_pem(&pair.public_key).unwrap(),
                    keys::private_key_to_pem(&pair.private_key).unwrap(),
                )
            })
            .collect()
    })
}

struct TestEnv {
    db: Arc<Database>,
    registry: ConversationRegistry,
    groups: GroupAdministration,
    service: MessagingService,
    keys: DbKeyStore,
    channel: DeliveryChannel,
}

fn env() -> TestEnv {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let channel = DeliveryChannel::new();
    let keys = DbKeyStore::new(db.clone());
    let service = MessagingService::new(
        db.clone(),
        Arc::new(OaepEngine::new()),
        Arc::new(keys.clone()),
        channel.clone(),
    );
    TestEnv {
        registry: ConversationRegistry::new(db.clone()),
        groups: GroupAdministration::new(db.clone()),
        service,
        keys,
        channel,
        db,
    }
}

impl TestEnv {
    fn user(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.db
            .create_user(&id.to_string(), name, "argon2-hash", None)
            .unwrap();
        id
    }

    /// User with key material installed from the shared pool. Distinct
    /// slots give distinct key pairs.
    fn keyed_user(&self, name: &str, slot: usize) -> Uuid {
        let id = self.user(name);
        let (public_pem, private_pem) = &pem_pool()[slot % pem_pool().len()];
        self.db
            .insert_key_pair_if_absent(&id.to_string(), public_pem, private_pem)
            .unwrap();
        id
    }

    fn make_contacts(&self, a: Uuid, b: Uuid) {
        self.db
            .add_mutual_contacts(&a.to_string(), &b.to_string())
            .unwrap();
    }
}

// -- ConversationRegistry --

#[test]
fn direct_conversation_is_unique_per_unordered_pair() {
    let env = env();
    let a = env.user("alice");
    let b = env.user("bob");
    env.make_contacts(a, b);

    let first = env.registry.get_or_create_direct(a, b).unwrap();
    let second = env.registry.get_or_create_direct(b, a).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.kind, ConversationKind::Direct);
    assert_eq!(env.registry.participants_of(first.id).unwrap().len(), 2);
}

#[test]
fn concurrent_direct_creation_yields_one_conversation() {
    let env = env();
    let a = env.user("alice");
    let b = env.user("bob");
    env.make_contacts(a, b);

    let r1 = env.registry.clone();
    let r2 = env.registry.clone();
    let h1 = std::thread::spawn(move || r1.get_or_create_direct(a, b).unwrap());
    let h2 = std::thread::spawn(move || r2.get_or_create_direct(b, a).unwrap());

    let c1 = h1.join().unwrap();
    let c2 = h2.join().unwrap();

    // Both callers observe the same winning row.
    assert_eq!(c1.id, c2.id);
    assert_eq!(env.registry.participants_of(c1.id).unwrap().len(), 2);
}

#[test]
fn self_conversation_is_rejected() {
    let env = env();
    let a = env.user("alice");
    let err = env.registry.get_or_create_direct(a, a).unwrap_err();
    assert!(matches!(err, CoreError::BadRequest(_)));
}

#[test]
fn first_contact_is_gated_as_message_request() {
    let env = env();
    let a = env.user("alice");
    let b = env.user("bob");

    let conversation = env.registry.get_or_create_direct(a, b).unwrap();

    // Recipient sees the request view, not the inbox.
    let requests: Vec<_> = env.registry.requests_for(b).unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].id, conversation.id);
    assert!(env.registry.conversations_for(b).unwrap().is_empty());

    // The initiator's inbox shows it immediately.
    assert_eq!(env.registry.conversations_for(a).unwrap().len(), 1);

    env.registry.accept_request(conversation.id, b).unwrap();
    assert!(env.registry.requests_for(b).unwrap().is_empty());
    assert_eq!(env.registry.conversations_for(b).unwrap().len(), 1);

    // Acceptance establishes the contact relation both ways.
    assert!(env.db.are_contacts(&a.to_string(), &b.to_string()).unwrap());
    assert!(env.db.are_contacts(&b.to_string(), &a.to_string()).unwrap());
}

#[test]
fn established_contacts_skip_the_request_gate() {
    let env = env();
    let a = env.user("alice");
    let b = env.user("bob");
    env.make_contacts(a, b);

    env.registry.get_or_create_direct(a, b).unwrap();
    assert!(env.registry.requests_for(b).unwrap().is_empty());
    assert_eq!(env.registry.conversations_for(b).unwrap().len(), 1);
}

#[tokio::test]
async fn decline_preserves_history_until_delete() {
    let env = env();
    let a = env.keyed_user("alice", 0);
    let b = env.keyed_user("bob", 1);

    let conversation = env.registry.get_or_create_direct(a, b).unwrap();
    env.service
        .send(conversation.id, a, "is the lamp still for sale?".into())
        .await
        .unwrap();

    env.registry.decline_request(conversation.id, b).unwrap();

    // Declined but not purged: history is still fetchable.
    let page = env.service.fetch(conversation.id, b, None, 50).await.unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(env.registry.requests_for(b).unwrap().len(), 1);

    env.registry.delete_request(conversation.id, b).unwrap();

    let err = env.registry.conversation(conversation.id).unwrap_err();
    assert!(matches!(err, CoreError::ConversationNotFound));
    let err = env.service.fetch(conversation.id, b, None, 50).await.unwrap_err();
    assert!(matches!(err, CoreError::ConversationNotFound));
}

// -- MessagingService: direct scheme --

#[tokio::test]
async fn direct_send_reveals_for_recipient_only() {
    let env = env();
    let a = env.keyed_user("alice", 0);
    let b = env.keyed_user("bob", 1);
    env.make_contacts(a, b);

    let conversation = env.registry.get_or_create_direct(a, b).unwrap();
    env.service
        .send(conversation.id, a, "offer accepted".into())
        .await
        .unwrap();

    let page = env.service.fetch(conversation.id, b, None, 50).await.unwrap();
    assert_eq!(page.messages.len(), 1);
    let message = &page.messages[0];

    // Recipient decrypts; the sender's copy is addressed to the recipient
    // and degrades to the placeholder.
    assert_eq!(env.service.reveal(message, b), "offer accepted");
    assert_eq!(env.service.reveal(message, a), UNDECRYPTABLE_PLACEHOLDER);
}

#[tokio::test]
async fn send_to_unkeyed_recipient_fails_with_key_not_found() {
    let env = env();
    let a = env.keyed_user("alice", 0);
    let b = env.user("bob"); // never keyed
    env.make_contacts(a, b);

    let conversation = env.registry.get_or_create_direct(a, b).unwrap();
    let err = env
        .service
        .send(conversation.id, a, "hello?".into())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::KeyNotFound(user) if user == b));
}

#[tokio::test]
async fn direct_scheme_enforces_size_bound() {
    let env = env();
    let a = env.keyed_user("alice", 0);
    let b = env.keyed_user("bob", 1);
    env.make_contacts(a, b);

    let conversation = env.registry.get_or_create_direct(a, b).unwrap();
    let oversized = "x".repeat(191);
    let err = env.service.send(conversation.id, a, oversized).await.unwrap_err();
    assert!(matches!(err, CoreError::BadRequest(_)));
}

#[tokio::test]
async fn send_enforces_referential_failures() {
    let env = env();
    let a = env.keyed_user("alice", 0);
    let b = env.keyed_user("bob", 1);
    let outsider = env.keyed_user("mallory", 2);
    env.make_contacts(a, b);

    let err = env
        .service
        .send(Uuid::new_v4(), a, "into the void".into())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ConversationNotFound));

    let conversation = env.registry.get_or_create_direct(a, b).unwrap();
    let err = env
        .service
        .send(conversation.id, outsider, "let me in".into())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotAParticipant));

    let err = env
        .service
        .fetch(conversation.id, outsider, None, 50)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotAParticipant));
}

// -- MessagingService: group scheme --

#[tokio::test]
async fn group_send_reveals_for_every_keyed_participant() {
    let env = env();
    let creator = env.keyed_user("alice", 0);
    let keyed = env.keyed_user("bob", 1);
    let unkeyed = env.user("carol");

    let conversation = env
        .registry
        .create_group(
            creator,
            "market watch",
            &[keyed, unkeyed],
            None,
            ConversationKind::Group,
        )
        .unwrap();

    // Group payloads are not bound by the asymmetric size limit.
    let body = "lot 47 just went live — ".repeat(40);
    env.service
        .send(conversation.id, creator, body.clone())
        .await
        .unwrap();

    let page = env
        .service
        .fetch(conversation.id, creator, None, 50)
        .await
        .unwrap();
    let message = &page.messages[0];

    assert_eq!(env.service.reveal(message, creator), body);
    assert_eq!(env.service.reveal(message, keyed), body);
    // No wrapped copy exists for the unkeyed participant.
    assert_eq!(env.service.reveal(message, unkeyed), UNDECRYPTABLE_PLACEHOLDER);
    assert_eq!(message.wrapped_keys.len(), 2);
}

#[tokio::test]
async fn fetch_order_is_stable_and_paginated() {
    let env = env();
    let creator = env.keyed_user("alice", 0);
    let member = env.keyed_user("bob", 1);

    let conversation = env
        .registry
        .create_group(creator, "deals", &[member], None, ConversationKind::Group)
        .unwrap();

    for i in 0..5 {
        env.service
            .send(conversation.id, creator, format!("message {}", i))
            .await
            .unwrap();
    }

    let once = env.service.fetch(conversation.id, member, None, 50).await.unwrap();
    let twice = env.service.fetch(conversation.id, member, None, 50).await.unwrap();
    let ids_once: Vec<_> = once.messages.iter().map(|m| m.id).collect();
    let ids_twice: Vec<_> = twice.messages.iter().map(|m| m.id).collect();
    assert_eq!(ids_once, ids_twice);
    assert_eq!(ids_once.len(), 5);

    // Ascending (created_at, id) order.
    for pair in once.messages.windows(2) {
        assert!((pair[0].created_at, pair[0].id) < (pair[1].created_at, pair[1].id));
    }

    // Pages chain through the cursor and cover the same sequence.
    let mut paged = Vec::new();
    let mut cursor = None;
    loop {
        let page = env
            .service
            .fetch(conversation.id, member, cursor, 2)
            .await
            .unwrap();
        paged.extend(page.messages.iter().map(|m| m.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(paged, ids_once);
}

// -- Reactions --

#[tokio::test]
async fn reaction_toggle_semantics() {
    let env = env();
    let a = env.keyed_user("alice", 0);
    let b = env.keyed_user("bob", 1);
    env.make_contacts(a, b);

    let conversation = env.registry.get_or_create_direct(a, b).unwrap();
    let message = env
        .service
        .send(conversation.id, a, "sold!".into())
        .await
        .unwrap();

    // Same emoji toggles the row off; a different emoji replaces it.
    assert_eq!(
        env.service.react(message.id, b, "👍".into()).await.unwrap(),
        ReactionChange::Added
    );
    assert_eq!(
        env.service.react(message.id, b, "👍".into()).await.unwrap(),
        ReactionChange::Removed
    );
    assert_eq!(
        env.service.react(message.id, b, "👍".into()).await.unwrap(),
        ReactionChange::Added
    );
    assert_eq!(
        env.service.react(message.id, b, "❤️".into()).await.unwrap(),
        ReactionChange::Replaced {
            previous: "👍".into()
        }
    );

    let reactions = env.service.reactions_for(vec![message.id]).await.unwrap();
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0].emoji, "❤️");
    assert_eq!(reactions[0].user_id, b);
}

#[tokio::test]
async fn reacting_requires_membership() {
    let env = env();
    let a = env.keyed_user("alice", 0);
    let b = env.keyed_user("bob", 1);
    let outsider = env.user("mallory");
    env.make_contacts(a, b);

    let conversation = env.registry.get_or_create_direct(a, b).unwrap();
    let message = env.service.send(conversation.id, a, "hi".into()).await.unwrap();

    let err = env
        .service
        .react(message.id, outsider, "👍".into())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotAParticipant));

    let err = env
        .service
        .react(Uuid::new_v4(), b, "👍".into())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::MessageNotFound));
}

// -- Deletion --

#[tokio::test]
async fn delete_is_sender_only_and_tombstones() {
    let env = env();
    let a = env.keyed_user("alice", 0);
    let b = env.keyed_user("bob", 1);
    env.make_contacts(a, b);

    let conversation = env.registry.get_or_create_direct(a, b).unwrap();
    let first = env.service.send(conversation.id, a, "one".into()).await.unwrap();
    let second = env.service.send(conversation.id, a, "two".into()).await.unwrap();

    let err = env.service.delete(first.id, b).await.unwrap_err();
    assert!(matches!(err, CoreError::NotAuthorized));

    env.service.delete(first.id, a).await.unwrap();

    // Hidden from display, retained in storage.
    let page = env.service.fetch(conversation.id, b, None, 50).await.unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].id, second.id);

    let row = env.db.get_message(&first.id.to_string()).unwrap().unwrap();
    assert!(row.deleted_at.is_some());
}

// -- Read cursors --

#[tokio::test]
async fn read_cursor_is_monotonic_and_drives_unread_counts() {
    let env = env();
    let a = env.keyed_user("alice", 0);
    let b = env.keyed_user("bob", 1);
    env.make_contacts(a, b);

    let conversation = env.registry.get_or_create_direct(a, b).unwrap();
    let first = env.service.send(conversation.id, a, "one".into()).await.unwrap();
    let second = env.service.send(conversation.id, a, "two".into()).await.unwrap();

    assert_eq!(env.service.unread_count(conversation.id, b).await.unwrap(), 2);

    env.service
        .mark_read(conversation.id, b, first.created_at)
        .await
        .unwrap();
    assert_eq!(env.service.unread_count(conversation.id, b).await.unwrap(), 1);

    // A later read position never regresses.
    env.service
        .mark_read(conversation.id, b, first.created_at - chrono::Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(env.service.unread_count(conversation.id, b).await.unwrap(), 1);

    env.service
        .mark_read(conversation.id, b, second.created_at)
        .await
        .unwrap();
    assert_eq!(env.service.unread_count(conversation.id, b).await.unwrap(), 0);
}

// -- Group administration --

#[test]
fn privileged_operations_require_admin() {
    let env = env();
    let creator = env.user("alice");
    let member = env.user("bob");
    let other = env.user("carol");

    let conversation = env
        .registry
        .create_group(creator, "stalls", &[member, other], None, ConversationKind::Group)
        .unwrap();

    let groups = &env.groups;
    assert!(matches!(
        groups.remove_member(conversation.id, member, other).unwrap_err(),
        CoreError::NotAuthorized
    ));
    assert!(matches!(
        groups.promote_admin(conversation.id, member, other).unwrap_err(),
        CoreError::NotAuthorized
    ));
    assert!(matches!(
        groups.demote_admin(conversation.id, member, creator).unwrap_err(),
        CoreError::NotAuthorized
    ));
    assert!(matches!(
        groups
            .update_group_metadata(conversation.id, member, Some("renamed"), None)
            .unwrap_err(),
        CoreError::NotAuthorized
    ));
    // Adding someone else needs admin status; joining yourself does not.
    let joiner = env.user("dave");
    assert!(matches!(
        groups.add_member(conversation.id, member, joiner).unwrap_err(),
        CoreError::NotAuthorized
    ));
    groups.add_member(conversation.id, joiner, joiner).unwrap();

    // Leaving needs no privilege.
    groups.leave_group(conversation.id, member).unwrap();
}

#[test]
fn last_admin_departure_promotes_next_oldest_participant() {
    let env = env();
    let creator = env.user("alice");
    let conversation = env
        .registry
        .create_group(creator, "vintage", &[], None, ConversationKind::Group)
        .unwrap();

    // Joined strictly after the creator, in order.
    let older = env.user("bob");
    let newer = env.user("carol");
    env.groups.add_member(conversation.id, creator, older).unwrap();
    env.groups.add_member(conversation.id, creator, newer).unwrap();

    env.groups.leave_group(conversation.id, creator).unwrap();

    // Exactly one new admin: the next-oldest remaining participant.
    assert_eq!(env.groups.admins_of(conversation.id).unwrap(), vec![older]);
}

#[test]
fn sole_member_leaving_empties_group_without_promotion() {
    let env = env();
    let creator = env.user("alice");
    let conversation = env
        .registry
        .create_group(creator, "solo", &[], None, ConversationKind::Group)
        .unwrap();

    env.groups.leave_group(conversation.id, creator).unwrap();

    assert!(env.registry.participants_of(conversation.id).unwrap().is_empty());
    assert!(env.groups.admins_of(conversation.id).unwrap().is_empty());
}

#[test]
fn demoting_the_only_admin_hands_over_or_rejects() {
    let env = env();
    let creator = env.user("alice");
    let member = env.user("bob");
    let conversation = env
        .registry
        .create_group(creator, "handover", &[member], None, ConversationKind::Group)
        .unwrap();

    env.groups.demote_admin(conversation.id, creator, creator).unwrap();
    assert_eq!(env.groups.admins_of(conversation.id).unwrap(), vec![member]);

    // A lone member cannot demote themselves into an admin-less group.
    let solo_creator = env.user("carol");
    let solo = env
        .registry
        .create_group(solo_creator, "lone", &[], None, ConversationKind::Group)
        .unwrap();
    let err = env
        .groups
        .demote_admin(solo.id, solo_creator, solo_creator)
        .unwrap_err();
    assert!(matches!(err, CoreError::BadRequest(_)));
}

#[test]
fn removed_member_loses_membership_and_admin_row() {
    let env = env();
    let creator = env.user("alice");
    let member = env.user("bob");
    let conversation = env
        .registry
        .create_group(creator, "cleanup", &[member], None, ConversationKind::Group)
        .unwrap();

    env.groups.promote_admin(conversation.id, creator, member).unwrap();
    env.groups.remove_member(conversation.id, creator, member).unwrap();

    assert_eq!(env.registry.participants_of(conversation.id).unwrap().len(), 1);
    assert_eq!(env.groups.admins_of(conversation.id).unwrap(), vec![creator]);
}

#[test]
fn metadata_updates_are_partial() {
    let env = env();
    let creator = env.user("alice");
    let conversation = env
        .registry
        .create_group(
            creator,
            "before",
            &[],
            Some("https://img.example/old.png"),
            ConversationKind::Group,
        )
        .unwrap();

    env.groups
        .update_group_metadata(conversation.id, creator, Some("after"), None)
        .unwrap();

    let updated = env.registry.conversation(conversation.id).unwrap();
    assert_eq!(updated.group_name.as_deref(), Some("after"));
    assert_eq!(
        updated.group_image_url.as_deref(),
        Some("https://img.example/old.png")
    );
}

// -- KeyStore --

#[test]
fn key_generation_is_idempotent_and_owner_bound() {
    let env = env();
    let owner = env.user("alice");
    let other = env.user("bob");

    let first = env.keys.generate_key_pair(owner).unwrap();
    let second = env.keys.generate_key_pair(owner).unwrap();
    assert_eq!(first.public_key, second.public_key);

    assert_eq!(
        env.keys.public_key(owner).unwrap(),
        first.public_key
    );
    assert!(matches!(
        env.keys.private_key(owner, other).unwrap_err(),
        agora_crypto::KeyStoreError::AccessDenied { .. }
    ));
    assert!(matches!(
        env.keys.public_key(other).unwrap_err(),
        agora_crypto::KeyStoreError::KeyNotFound(user) if user == other
    ));
}

#[test]
fn profile_lookup_falls_back_to_username() {
    let env = env();
    let a = env.user("alice");

    let profile = env.registry.profile_of(a).unwrap().unwrap();
    assert_eq!(profile.display_name, "alice");
    assert!(profile.avatar_url.is_none());

    assert!(env.registry.profile_of(Uuid::new_v4()).unwrap().is_none());
}

// -- Delivery channel integration --

#[tokio::test]
async fn send_publishes_delivery_event_to_conversation_topic() {
    let env = env();
    let a = env.keyed_user("alice", 0);
    let b = env.keyed_user("bob", 1);
    env.make_contacts(a, b);

    let conversation = env.registry.get_or_create_direct(a, b).unwrap();
    let mut rx = env.channel.subscribe(conversation.id).await;

    let message = env
        .service
        .send(conversation.id, a, "ready for pickup".into())
        .await
        .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.table, "messages");
    assert_eq!(event.conversation_id, conversation.id);
    assert_eq!(event.row["id"], message.id.to_string());
}
