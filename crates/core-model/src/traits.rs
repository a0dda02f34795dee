use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeResult;

/// Cryptographic signature verification and key resolution, assumed to be
/// an external collaborator per the distilled spec. The node depends on
/// this trait rather than a concrete crypto stack so the verification
/// backend can be swapped without touching object services.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Verifies that `signature` is a valid signature over `document` by
    /// `signer` (a ccid or cckey). Returns `Err(NodeError::Signature)` on
    /// any verification failure, including an unresolvable signer key.
    async fn verify(&self, document: &Value, signer: &str, signature: &str) -> NodeResult<()>;
}

/// The policy evaluation engine, assumed to expose a single boolean
/// predicate per the distilled spec. Evaluation failures are treated as
/// "deny" by callers -- this trait itself does not encode that fallback so
/// callers can log the distinct failure reason.
#[async_trait]
pub trait PolicyClient: Send + Sync {
    /// Evaluates `policyURL` against `context` for `action` (e.g.
    /// `"distribute"`). A transport or evaluation error is surfaced to the
    /// caller rather than silently coerced to `false`.
    async fn test(&self, policy_url: &str, context: &Value, action: &str) -> NodeResult<bool>;
}

/// A `PolicyClient` that treats every URL as permissive. Useful for tests
/// and for timelines that never set a policy URL, where the service layer
/// otherwise has to special-case "no policy" separately from "policy says
/// yes".
pub struct AllowAllPolicy;

#[async_trait]
impl PolicyClient for AllowAllPolicy {
    async fn test(&self, _policy_url: &str, _context: &Value, _action: &str) -> NodeResult<bool> {
        Ok(true)
    }
}

/// A `SignatureVerifier` standing in for the real key-resolution/crypto
/// backend the distilled spec treats as an external collaborator. Accepts
/// every signature. Wired in at startup until a real verifier (backed by
/// the entity/key directory) is available; swappable without touching the
/// object services, which only ever see the trait.
pub struct NoopSignatureVerifier;

#[async_trait]
impl SignatureVerifier for NoopSignatureVerifier {
    async fn verify(&self, _document: &Value, _signer: &str, _signature: &str) -> NodeResult<()> {
        Ok(())
    }
}
