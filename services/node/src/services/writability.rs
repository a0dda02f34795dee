//! The `PostItem` writability decision: encoded as an explicit 3-case
//! table rather than chained control flow.

use core_model::{PolicyClient, Timeline};
use serde_json::json;

pub struct WritabilityCheck {
    pub writable: bool,
    pub reason: &'static str,
}

/// Decides whether `author` may post to `timeline`.
///
/// 1. Timeline's own author posting to it is always writable.
/// 2. A domain-owned timeline is writable unless a policy URL is set and
///    the policy denies.
/// 3. Anything else is not writable unless a policy says yes.
pub async fn check(
    timeline: &Timeline,
    author: &str,
    policy: &dyn PolicyClient,
) -> WritabilityCheck {
    if timeline.author == author {
        return WritabilityCheck {
            writable: true,
            reason: "owner",
        };
    }

    let context = json!({
        "self": timeline.author,
        "params": timeline.policy_params,
        "requester": author,
    });

    if timeline.domain_owned {
        return match &timeline.policy {
            None => WritabilityCheck {
                writable: true,
                reason: "domain-owned, no policy",
            },
            Some(url) => match policy.test(url, &context, "distribute").await {
                Ok(true) => WritabilityCheck {
                    writable: true,
                    reason: "domain-owned, policy allowed",
                },
                Ok(false) => WritabilityCheck {
                    writable: false,
                    reason: "domain-owned, policy denied",
                },
                Err(_) => WritabilityCheck {
                    writable: false,
                    reason: "domain-owned, policy evaluation failed",
                },
            },
        };
    }

    match &timeline.policy {
        None => WritabilityCheck {
            writable: false,
            reason: "not owner, no policy",
        },
        Some(url) => match policy.test(url, &context, "distribute").await {
            Ok(true) => WritabilityCheck {
                writable: true,
                reason: "policy allowed",
            },
            Ok(false) => WritabilityCheck {
                writable: false,
                reason: "policy denied",
            },
            Err(_) => WritabilityCheck {
                writable: false,
                reason: "policy evaluation failed",
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_model::AllowAllPolicy;

    fn timeline(author: &str, domain_owned: bool, policy: Option<&str>) -> Timeline {
        Timeline {
            id: "tTEST".to_owned(),
            author: author.to_owned(),
            schema: "test".to_owned(),
            policy: policy.map(str::to_owned),
            policy_params: None,
            domain_owned,
            indexable: true,
        }
    }

    #[tokio::test]
    async fn owner_is_always_writable() {
        let t = timeline("conAuthor", false, None);
        let result = check(&t, "conAuthor", &AllowAllPolicy).await;
        assert!(result.writable);
    }

    #[tokio::test]
    async fn non_owner_without_policy_is_not_writable() {
        let t = timeline("conAuthor", false, None);
        let result = check(&t, "conOther", &AllowAllPolicy).await;
        assert!(!result.writable);
    }

    #[tokio::test]
    async fn domain_owned_without_policy_is_writable() {
        let t = timeline("conAuthor", true, None);
        let result = check(&t, "conOther", &AllowAllPolicy).await;
        assert!(result.writable);
    }

    #[tokio::test]
    async fn domain_owned_with_allowing_policy_is_writable() {
        let t = timeline("conAuthor", true, Some("https://policy.example/p"));
        let result = check(&t, "conOther", &AllowAllPolicy).await;
        assert!(result.writable);
    }
}
