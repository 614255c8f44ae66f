//! The encrypted messaging core: canonical conversation state, group
//! administration and the send/fetch/react/delete orchestration over the
//! injected crypto seams.
//!
//! Every component is request-scoped — no state is held in memory beyond
//! a call except the delivery-channel topics owned by agora-gateway.

mod convert;

pub mod error;
pub mod groups;
pub mod keystore;
pub mod registry;
pub mod service;

pub use agora_db::models::ReactionChange;
pub use error::{CoreError, CoreResult};
pub use groups::GroupAdministration;
pub use keystore::DbKeyStore;
pub use registry::ConversationRegistry;
pub use service::{MessageCursor, MessagePage, MessagingService};
