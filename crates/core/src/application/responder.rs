// Responder - adapts a transaction to a transport response (HTTP, RPC, CLI)

use super::context::ExecutionContext;
use super::transaction::Executable;
use crate::domain::DomainError;
use crate::error::{Result, TransactionError};
use tracing::{debug, error};

/// Stable numeric codes for transport adapters
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const INVALID_CHAIN_STEP: i32 = 4001;
    pub const CONFLICT: i32 = 4090;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const STORE_ERROR: i32 = 5001;
    pub const COMPENSATION_FAILED: i32 = 5002;
    pub const CONFIG_ERROR: i32 = 5003;
}

/// Map a failure to its numeric code
pub fn error_code(err: &TransactionError) -> i32 {
    match err {
        TransactionError::ValidationFailed(_) => code::VALIDATION_ERROR,
        TransactionError::Domain(DomainError::ValidationError(_)) => code::VALIDATION_ERROR,
        TransactionError::InvalidChainStep { .. } => code::INVALID_CHAIN_STEP,
        TransactionError::Domain(DomainError::InvalidStateTransition { .. }) => code::CONFLICT,
        TransactionError::Hold { .. } => code::CONFLICT,
        TransactionError::PerformFailed(_) | TransactionError::Publish(_) => code::INTERNAL_ERROR,
        TransactionError::Store(_) => code::STORE_ERROR,
        TransactionError::SideEffectRevertFailed { .. }
        | TransactionError::CleanupFailed { .. }
        | TransactionError::CompensationFailed { .. } => code::COMPENSATION_FAILED,
        TransactionError::EventConstructionInvalid(_) | TransactionError::Config(_) => {
            code::CONFIG_ERROR
        }
    }
}

/// Builds the transaction for a request and shapes the outcome into a response
pub trait Responder: Send + Sync {
    type Request: Send;
    type Response: Clone + Send;

    fn create_transaction(&self, request: Self::Request) -> Result<Box<dyn Executable>>;

    /// Response for a transaction that executed successfully
    fn response_after_execution(&self, transaction: &dyn Executable) -> Self::Response;

    /// Turn a failure into a response. Propagates by default.
    fn error_to_response(&self, error: TransactionError) -> Result<Self::Response> {
        Err(error)
    }
}

enum Source<Req> {
    Request(Req),
    Transaction(Box<dyn Executable>),
}

/// Executes a responder's transaction once and memoizes the response
pub struct TransactionResponse<R: Responder> {
    responder: R,
    source: Option<Source<R::Request>>,
    response: Option<R::Response>,
}

impl<R: Responder> TransactionResponse<R> {
    pub fn new(responder: R, request: R::Request) -> Self {
        Self {
            responder,
            source: Some(Source::Request(request)),
            response: None,
        }
    }

    /// Respond for an already built transaction instead of creating one
    pub fn with_transaction(responder: R, transaction: Box<dyn Executable>) -> Self {
        Self {
            responder,
            source: Some(Source::Transaction(transaction)),
            response: None,
        }
    }

    pub fn responder(&self) -> &R {
        &self.responder
    }

    /// Execute on first call; later calls return the cached response
    pub async fn respond(&mut self, ctx: &ExecutionContext) -> Result<R::Response> {
        if let Some(response) = &self.response {
            debug!("Returning memoized response");
            return Ok(response.clone());
        }

        let mut transaction = match self.source.take() {
            Some(Source::Transaction(tx)) => tx,
            Some(Source::Request(request)) => self.responder.create_transaction(request)?,
            None => {
                return Err(DomainError::InvalidStateTransition {
                    from: "responded".to_string(),
                    to: "executing".to_string(),
                }
                .into())
            }
        };

        let response = match transaction.execute(ctx).await {
            Ok(()) => self.responder.response_after_execution(transaction.as_ref()),
            Err(e) => {
                error!(
                    transaction_id = ?transaction.id(),
                    code = error_code(&e),
                    error = %e,
                    "Transaction failed while building response"
                );
                self.responder.error_to_response(e)?
            }
        };

        self.response = Some(response.clone());
        Ok(response)
    }
}
