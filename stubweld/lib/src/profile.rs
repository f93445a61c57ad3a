//! Domain-name profile for a stub tree.
//!
//! Every class name, placeholder identifier and path marker the rewrite
//! passes key on is data, not code, so the same engine can be pointed at a
//! differently-named SDK by loading an override profile.

use serde::{Deserialize, Serialize};

/// Which of the two generic endpoint placeholders an identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Request,
    Response,
}

/// The names the rewrites recognize in a stub tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Base class every endpoint controller extends.
    pub controller_class: String,
    /// Private runtime request-manager class nested in the controller.
    pub manager_class: String,
    /// Nested class holding user-facing operation methods.
    pub operations_class: String,
    /// Generic placeholder bound to the request model.
    pub request_placeholder: String,
    /// Generic placeholder bound to the response model.
    pub response_placeholder: String,
    /// Base classes marking a domain model worth a TypedDict record.
    pub base_model_classes: Vec<String>,
    /// Dotted package prefix of the runtime domain modules.
    pub domain_package: String,
    /// Path fragment identifying controller-API stubs.
    pub controller_path_marker: String,
    /// Path fragment identifying API stubs worth keeping.
    pub api_path_marker: String,
    /// Path fragment identifying domain stubs worth keeping.
    pub domain_path_marker: String,
    /// Directory of domain-model stubs, relative to the scratch root.
    pub domain_stub_dir: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            controller_class: "NexosAIAPIEndpointController".to_string(),
            manager_class: "_RequestManager".to_string(),
            operations_class: "Operations".to_string(),
            request_placeholder: "EndpointRequestType".to_string(),
            response_placeholder: "EndpointResponseType".to_string(),
            base_model_classes: vec![
                "BaseModel".to_string(),
                "NullableBaseModel".to_string(),
                "NexosAPIRequest".to_string(),
                "NexosAPIResponse".to_string(),
            ],
            domain_package: "nexosapi.domain".to_string(),
            controller_path_marker: "/api/controller".to_string(),
            api_path_marker: "/api/".to_string(),
            domain_path_marker: "/domain/".to_string(),
            domain_stub_dir: "nexosapi/domain".to_string(),
        }
    }
}

impl Profile {
    /// Classifies an identifier as one of the endpoint placeholders.
    ///
    /// Stub generators decorate the placeholder type variables with variance
    /// markers, so `EndpointRequestType`, `_EndpointRequestType` and
    /// `~_EndpointRequestType` all count.
    pub fn placeholder_kind(&self, name: &str) -> Option<PlaceholderKind> {
        let bare = name
            .strip_prefix("~_")
            .or_else(|| name.strip_prefix('_'))
            .unwrap_or(name);
        if bare == self.request_placeholder {
            Some(PlaceholderKind::Request)
        } else if bare == self.response_placeholder {
            Some(PlaceholderKind::Response)
        } else {
            None
        }
    }

    /// Public name of the synthesized builder class: the manager class name
    /// with its private prefix stripped (`_RequestManager` -> `RequestManager`).
    pub fn builder_class_name(&self) -> &str {
        self.manager_class.trim_start_matches('_')
    }

    /// Whether a base-class list marks a domain model.
    pub fn is_model_base(&self, name: &str) -> bool {
        self.base_model_classes.iter().any(|base| base == name)
    }
}
