//! Model routing: registry lookup plus vendor environment resolution.

use std::sync::Arc;

use crate::error::BridgeError;
use crate::registry::{ModelDescriptor, ProviderFamily, ProviderRegistry};

/// Generic credential variable copied into family-specific ones when those
/// are unset.
pub const GENERIC_API_KEY_ENV: &str = "LLM_API_KEY";

/// xAI speaks the OpenAI-compatible protocol at its own API root, so its
/// routes carry a per-call base-url override.
pub const XAI_BASE_URL: &str = "https://api.x.ai/v1";

/// Per-call routing context.
///
/// Created by [`ModelRouter::route`], never mutated afterwards, never shared
/// across calls.
#[derive(Debug, Clone)]
pub struct RouteContext {
    /// Resolved model descriptor
    pub descriptor: ModelDescriptor,
    /// Environment variable holding the credential for this vendor family
    pub credential_env_var: &'static str,
    /// Per-call base URL replacing the family default, when set
    pub base_url_override: Option<String>,
}

/// Resolves public model names into per-call [`RouteContext`]s.
///
/// Construction performs credential wiring once: for each family variable
/// that is unset while the generic [`GENERIC_API_KEY_ENV`] is set, the
/// generic value is copied over. An already-set family variable is never
/// overwritten, so repeated construction is idempotent.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    registry: Arc<ProviderRegistry>,
}

impl ModelRouter {
    /// Create a router over the builtin model catalog.
    pub fn new() -> Self {
        Self::with_registry(ProviderRegistry::with_builtin_models())
    }

    /// Create a router over a caller-supplied registry.
    pub fn with_registry(registry: ProviderRegistry) -> Self {
        wire_credentials();
        Self {
            registry: Arc::new(registry),
        }
    }

    /// The registry backing this router.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolve a public model name into a routing context.
    ///
    /// The only local failure is [`BridgeError::UnknownModel`]; no network
    /// calls happen here.
    pub fn route(&self, public_name: &str) -> Result<RouteContext, BridgeError> {
        let descriptor = self.registry.resolve(public_name)?.clone();
        let credential_env_var = credential_env_var(descriptor.family);
        let base_url_override = match descriptor.family {
            ProviderFamily::Xai => Some(XAI_BASE_URL.to_string()),
            _ => None,
        };
        Ok(RouteContext {
            descriptor,
            credential_env_var,
            base_url_override,
        })
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Credential environment variable for a vendor family.
pub fn credential_env_var(family: ProviderFamily) -> &'static str {
    match family {
        ProviderFamily::OpenAiCompatible => "OPENAI_API_KEY",
        ProviderFamily::Anthropic => "ANTHROPIC_API_KEY",
        ProviderFamily::CloudGateway => "BEDROCK_API_KEY",
        ProviderFamily::Xai => "XAI_API_KEY",
        ProviderFamily::Gemini => "GEMINI_API_KEY",
    }
}

const FAMILY_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "BEDROCK_API_KEY",
    "XAI_API_KEY",
    "GEMINI_API_KEY",
];

/// Copy the generic credential into unset family variables.
///
/// Copy-once semantics: a family variable that already has a value is left
/// untouched, whether it was set by the operator or by an earlier wiring
/// pass.
fn wire_credentials() {
    let Ok(generic) = std::env::var(GENERIC_API_KEY_ENV) else {
        return;
    };
    if generic.is_empty() {
        return;
    }
    for var in FAMILY_ENV_VARS {
        if std::env::var(var).is_err() {
            tracing::debug!(variable = var, "copying generic credential into family variable");
            unsafe {
                std::env::set_var(var, &generic);
            }
        }
    }
}
