//! Provider registry: public model names and their vendor routing data.
//!
//! Registry entries are data, not code. Adding a vendor means adding entries
//! plus one wire-name transform arm; the streaming logic is never touched.

use std::collections::HashMap;

use crate::error::BridgeError;

/// Routing prefix used by the managed-cloud model gateway.
const GATEWAY_PREFIX: &str = "bedrock";

/// Closed set of provider families the bridge can route to.
///
/// Centralizing the family ids here avoids stringly-typed routing scattered
/// across layers: each family gets exactly one wire-name transform and one
/// request-builder path, selected once at registry-resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    /// OpenAI and OpenAI-compatible REST vendors
    OpenAiCompatible,
    /// Anthropic direct API
    Anthropic,
    /// Managed-cloud model gateway (hosted open/proprietary models)
    CloudGateway,
    /// xAI (OpenAI-compatible wire protocol at its own API root)
    Xai,
    /// Google Gemini
    Gemini,
}

impl ProviderFamily {
    /// Canonical family id used in routing namespaces and logs.
    pub fn id(&self) -> &'static str {
        match self {
            Self::OpenAiCompatible => "openai",
            Self::Anthropic => "anthropic",
            Self::CloudGateway => GATEWAY_PREFIX,
            Self::Xai => "xai",
            Self::Gemini => "gemini",
        }
    }

    /// Parse a canonical family id.
    pub fn parse(id: &str) -> Option<Self> {
        match id {
            "openai" => Some(Self::OpenAiCompatible),
            "anthropic" => Some(Self::Anthropic),
            GATEWAY_PREFIX => Some(Self::CloudGateway),
            "xai" => Some(Self::Xai),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }

    /// Whether this family speaks the OpenAI-compatible wire protocol.
    pub fn is_openai_wire(&self) -> bool {
        matches!(
            self,
            Self::OpenAiCompatible | Self::Xai | Self::CloudGateway
        )
    }
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Upstream vendors reachable through the cloud gateway.
///
/// The gateway namespaces its hosted models with a vendor-specific dotted
/// segment; this is the fixed lookup for those segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayVendor {
    Anthropic,
    Meta,
    Amazon,
}

impl GatewayVendor {
    /// Dotted segment the gateway expects in front of the model name.
    pub fn dotted_segment(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic.",
            Self::Meta => "meta.",
            Self::Amazon => "amazon.",
        }
    }
}

/// Immutable mapping from a public model name to its vendor routing data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// The name callers use
    pub public_name: String,
    /// Vendor family the model routes to
    pub family: ProviderFamily,
    /// Gateway vendor namespace, set only for [`ProviderFamily::CloudGateway`]
    pub gateway_vendor: Option<GatewayVendor>,
    /// The model identifier the vendor's API expects
    pub wire_name: String,
}

impl ModelDescriptor {
    /// Build a descriptor, computing the wire name from the family transform.
    ///
    /// Transform rules (vendors reject malformed ids, so these are exact):
    /// - cloud-gateway models become `bedrock/<vendor-segment><public_name>`;
    /// - OpenAI-compatible and xAI native ids are already the public name;
    /// - Gemini models gain the `gemini/` routing namespace;
    /// - every other family defaults to `<family>/<public_name>`.
    pub fn new(
        public_name: impl Into<String>,
        family: ProviderFamily,
        gateway_vendor: Option<GatewayVendor>,
    ) -> Result<Self, BridgeError> {
        let public_name = public_name.into();
        if public_name.trim().is_empty() {
            return Err(BridgeError::InvalidParameter(
                "model public name must not be empty".to_string(),
            ));
        }

        let wire_name = match family {
            ProviderFamily::CloudGateway => {
                let vendor = gateway_vendor.ok_or_else(|| {
                    BridgeError::InvalidParameter(format!(
                        "gateway model '{public_name}' requires a gateway vendor"
                    ))
                })?;
                format!(
                    "{GATEWAY_PREFIX}/{}{public_name}",
                    vendor.dotted_segment()
                )
            }
            ProviderFamily::OpenAiCompatible | ProviderFamily::Xai => public_name.clone(),
            ProviderFamily::Gemini => format!("gemini/{public_name}"),
            other => format!("{}/{public_name}", other.id()),
        };

        Ok(Self {
            public_name,
            family,
            gateway_vendor,
            wire_name,
        })
    }

    /// Model id at the HTTP-endpoint level: the wire name with the routing
    /// namespace stripped. OpenAI-compatible and xAI ids are identical in
    /// both layers.
    pub fn endpoint_model(&self) -> &str {
        match self.family {
            ProviderFamily::OpenAiCompatible | ProviderFamily::Xai => &self.wire_name,
            _ => self
                .wire_name
                .split_once('/')
                .map(|(_, rest)| rest)
                .unwrap_or(&self.wire_name),
        }
    }
}

/// Static/configurable mapping from public model names to descriptors.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    by_public_name: HashMap<String, ModelDescriptor>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the builtin model catalog pre-registered.
    pub fn with_builtin_models() -> Self {
        let mut registry = Self::new();
        for (name, family, vendor) in builtin_model_catalog() {
            // Catalog entries are static and well-formed.
            let descriptor = ModelDescriptor::new(*name, *family, *vendor)
                .expect("builtin catalog entry must be valid");
            registry.register(descriptor);
        }
        registry
    }

    /// Register a descriptor, replacing any previous entry with the same
    /// public name.
    pub fn register(&mut self, descriptor: ModelDescriptor) {
        self.by_public_name
            .insert(descriptor.public_name.clone(), descriptor);
    }

    /// Resolve a public model name.
    pub fn resolve(&self, public_name: &str) -> Result<&ModelDescriptor, BridgeError> {
        self.by_public_name
            .get(public_name)
            .ok_or_else(|| BridgeError::UnknownModel(public_name.to_string()))
    }

    /// All registered descriptors, in no particular order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.by_public_name.values()
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.by_public_name.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.by_public_name.is_empty()
    }
}

/// Builtin model catalog: (public name, family, gateway vendor).
fn builtin_model_catalog() -> &'static [(
    &'static str,
    ProviderFamily,
    Option<GatewayVendor>,
)] {
    &[
        // OpenAI-compatible direct vendors
        ("gpt-4o", ProviderFamily::OpenAiCompatible, None),
        ("gpt-4o-mini", ProviderFamily::OpenAiCompatible, None),
        ("gpt-4.1", ProviderFamily::OpenAiCompatible, None),
        // Anthropic direct
        (
            "claude-3-5-sonnet-20241022",
            ProviderFamily::Anthropic,
            None,
        ),
        (
            "claude-3-5-haiku-20241022",
            ProviderFamily::Anthropic,
            None,
        ),
        // Managed cloud gateway
        (
            "claude-instant-v1",
            ProviderFamily::CloudGateway,
            Some(GatewayVendor::Anthropic),
        ),
        (
            "llama3-70b-instruct-v1:0",
            ProviderFamily::CloudGateway,
            Some(GatewayVendor::Meta),
        ),
        (
            "titan-text-express-v1",
            ProviderFamily::CloudGateway,
            Some(GatewayVendor::Amazon),
        ),
        // xAI
        ("grok-2-latest", ProviderFamily::Xai, None),
        ("grok-3", ProviderFamily::Xai, None),
        // Google
        ("gemini-1.5-pro", ProviderFamily::Gemini, None),
        ("gemini-2.0-flash", ProviderFamily::Gemini, None),
    ]
}
