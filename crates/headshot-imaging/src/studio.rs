//! Headshot studio
//!
//! Charges one credit through the ledger, then calls the generator. The
//! credit is committed before the external call starts and is not refunded
//! if the call fails; a retry with the same idempotency key is not charged
//! again. Once a generation under a key has been delivered, the key is spent
//! and further calls with it are rejected.

use std::sync::Arc;
use std::time::{Duration, Instant};

use headshot_ledger::{EntitlementLedger, LedgerError};
use headshot_types::{AccountId, IdempotencyKey, StyleId, MAX_UPLOAD_BYTES};
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::generator::{GeneratedImage, GenerationError, ImageGenerator, SourceImage};

/// Default bound on one generation
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(90);

/// Studio errors
#[derive(Error, Debug)]
pub enum StudioError {
    #[error("invalid image: {0}")]
    InvalidImage(&'static str),

    /// Balance exhausted on a metered plan
    #[error("insufficient credits")]
    InsufficientCredits,

    /// The key already paid for a delivered generation
    #[error("idempotency key already used for a completed generation")]
    AlreadyCompleted,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// A generated headshot and the balance after paying for it
#[derive(Debug, Clone)]
pub struct Headshot {
    pub image: GeneratedImage,
    pub style: StyleId,
    pub credits_remaining: i64,
}

/// Consume-then-generate orchestration
#[derive(Clone)]
pub struct Studio {
    ledger: EntitlementLedger,
    generator: Arc<dyn ImageGenerator>,
    timeout: Duration,
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Studio {
    pub fn new(ledger: EntitlementLedger, generator: Arc<dyn ImageGenerator>) -> Self {
        Self {
            ledger,
            generator,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generate a headshot for `account`, paying one credit under `key`
    #[instrument(skip(self, key, image), fields(account_id = %account, style = %style))]
    pub async fn generate_headshot(
        &self,
        account: AccountId,
        key: &IdempotencyKey,
        image: SourceImage,
        style: StyleId,
    ) -> Result<Headshot, StudioError> {
        validate(&image)?;

        let decision = self.ledger.try_consume_credit(account, key).await?;
        if !decision.granted {
            counter!("headshot_generations_total", "result" => "denied").increment(1);
            return Err(StudioError::InsufficientCredits);
        }
        if decision.completed {
            counter!("headshot_generations_total", "result" => "already_completed").increment(1);
            warn!("Idempotency key reused after a completed generation");
            return Err(StudioError::AlreadyCompleted);
        }

        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.generator.generate(&image, style)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Transient(format!(
                "generation exceeded {}s",
                self.timeout.as_secs()
            ))),
        };
        histogram!("headshot_generation_duration_seconds").record(start.elapsed().as_secs_f64());

        match result {
            Ok(generated) => {
                if !self.ledger.complete_attempt(account, key).await? {
                    // a concurrent retry of the same key delivered first
                    counter!("headshot_generations_total", "result" => "already_completed")
                        .increment(1);
                    warn!("Generation discarded, key completed by a concurrent retry");
                    return Err(StudioError::AlreadyCompleted);
                }
                counter!("headshot_generations_total", "result" => "success").increment(1);
                info!(
                    credits_remaining = decision.credits_remaining,
                    replayed = decision.replayed,
                    "Headshot generated"
                );
                Ok(Headshot {
                    image: generated,
                    style,
                    credits_remaining: decision.credits_remaining,
                })
            }
            Err(e) => {
                let label = if e.is_transient() { "transient" } else { "permanent" };
                counter!("headshot_generations_total", "result" => label).increment(1);
                warn!(error = %e, "Headshot generation failed after credit was consumed");
                Err(e.into())
            }
        }
    }
}

fn validate(image: &SourceImage) -> Result<(), StudioError> {
    if image.bytes.is_empty() {
        return Err(StudioError::InvalidImage("image is empty"));
    }
    if image.bytes.len() as i64 > MAX_UPLOAD_BYTES {
        return Err(StudioError::InvalidImage("image is larger than 10 MiB"));
    }
    if !image.mime_type.starts_with("image/") {
        return Err(StudioError::InvalidImage("not an image"));
    }
    Ok(())
}
