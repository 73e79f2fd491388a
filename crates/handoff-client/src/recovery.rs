//! Recovery of transactions left open by a failed producer.
//!
//! A checkpointing system persists a [`ResumeToken`] next to its own state
//! while a transaction is open. After a crash, the replacement process reads
//! the token back and finishes the transaction with whatever outcome its
//! checkpoint decided:
//!
//! ```ignore
//! // before the crash
//! let token = session.resume_token()?;
//! checkpoint.store("producer", token.to_json()?);
//!
//! // after the crash
//! let token = ResumeToken::from_json(&checkpoint.load("producer"))?;
//! recover_transaction(
//!     || InMemoryTransport::new(broker.clone()),
//!     &config,
//!     &token,
//!     TransactionResult::Commit,
//!     &RetryPolicy::default(),
//! )
//! .await?;
//! ```
//!
//! Committing a transaction that was already committed, by the original
//! producer or an earlier recovery attempt, succeeds without effect, so the
//! recovery may be repeated safely.

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::retry::{retry_with_jittered_backoff, RetryPolicy};
use crate::session::ProducerSession;
use handoff_core::{ProducerIdentity, TransactionResult, Transport};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Persisted identity of a producer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken {
    pub transactional_id: String,
    pub producer_id: i64,
    pub epoch: i16,
}

impl ResumeToken {
    pub fn new(transactional_id: impl Into<String>, identity: ProducerIdentity) -> Self {
        Self {
            transactional_id: transactional_id.into(),
            producer_id: identity.producer_id,
            epoch: identity.epoch,
        }
    }

    pub fn identity(&self) -> ProducerIdentity {
        ProducerIdentity::new(self.producer_id, self.epoch)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SessionError::Config(format!("cannot encode resume token: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SessionError::Config(format!("invalid resume token: {}", e)))
    }
}

/// Finish the transaction identified by `token` with `outcome`.
///
/// Each attempt resumes a fresh session over a new transport from
/// `make_transport`, ends the transaction and closes the session, whatever the
/// result. Retriable errors are retried per `policy` with jittered backoff;
/// fencing and other rejections are returned immediately.
pub async fn recover_transaction<F, T>(
    mut make_transport: F,
    config: &SessionConfig,
    token: &ResumeToken,
    outcome: TransactionResult,
    policy: &RetryPolicy,
) -> Result<()>
where
    F: FnMut() -> T,
    T: Transport,
{
    retry_with_jittered_backoff(policy, || {
        let built = ProducerSession::builder()
            .config(config.clone())
            .transport(make_transport())
            .build();
        async move {
            let mut session = built?;

            let result: Result<()> = match session.resume_from(token).await {
                Ok(()) => match outcome {
                    TransactionResult::Commit => session.commit_transaction().await,
                    TransactionResult::Abort => session.abort_transaction().await,
                },
                Err(e) => Err(e),
            };

            let timeout = session.config().close_timeout;
            session.close(timeout).await;
            result
        }
    })
    .await?;

    info!(
        transactional_id = %token.transactional_id,
        producer_id = token.producer_id,
        epoch = token.epoch,
        %outcome,
        "Recovered transaction"
    );
    Ok(())
}
