//! Authorization decisions for authenticated subjects.

use axum::http::Method;

use crate::config::PolicyRule;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    #[error("invalid policy rule {index}: {reason}")]
    InvalidRule { index: usize, reason: String },
    #[error("authorizer unavailable: {0}")]
    Unavailable(String),
}

/// Decides whether `subject` may perform `method` on `path`.
///
/// An `Err` is treated as a denial by callers.
pub trait Authorizer: Send + Sync + 'static {
    fn authorize(&self, subject: &str, method: &Method, path: &str) -> Result<bool, AuthzError>;
}

/// Permits every authenticated request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _subject: &str, _method: &Method, _path: &str) -> Result<bool, AuthzError> {
        Ok(true)
    }
}

#[derive(Debug, Clone)]
struct Rule {
    subject: Option<String>,
    methods: Vec<Method>,
    path_prefix: String,
}

impl Rule {
    fn matches(&self, subject: &str, method: &Method, path: &str) -> bool {
        self.subject.as_deref().is_none_or(|s| s == subject)
            && (self.methods.is_empty() || self.methods.contains(method))
            && path.starts_with(&self.path_prefix)
    }
}

/// Allow-list built from `[[auth.policy]]`. A request is permitted when any
/// rule matches; with no rules everything is denied.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicy {
    rules: Vec<Rule>,
}

impl StaticPolicy {
    pub fn from_rules(rules: &[PolicyRule]) -> Result<Self, AuthzError> {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                let methods = rule
                    .methods
                    .iter()
                    .map(|m| {
                        Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|_| {
                            AuthzError::InvalidRule {
                                index,
                                reason: format!("invalid method '{m}'"),
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Rule {
                    subject: (rule.subject != "*").then(|| rule.subject.clone()),
                    methods,
                    path_prefix: rule.path_prefix.clone(),
                })
            })
            .collect::<Result<Vec<_>, AuthzError>>()?;
        Ok(Self { rules })
    }
}

impl Authorizer for StaticPolicy {
    fn authorize(&self, subject: &str, method: &Method, path: &str) -> Result<bool, AuthzError> {
        Ok(self.rules.iter().any(|r| r.matches(subject, method, path)))
    }
}
