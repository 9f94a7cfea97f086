use actix_web::HttpRequest;
use log::{debug, error};
use sqlx::types::ipnetwork::IpNetwork;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::stores::AuditStore;
use crate::error::AppResult;
use crate::models::{AuditLog, NewAuditLog};
use crate::utils::request_info::{client_ip_network, user_agent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    PaymentOrderCreated,
    PaymentCompleted,
    PaymentFailed,
    PaymentVerified,
    PaymentRefunded,
    CreditsPurchased,
    CreditsUsed,
    CreditsRefunded,
    CreditsAdded,
    FolderCreated,
    FolderUpdated,
    FolderDeleted,
    ImageMoved,
    ImageDeleted,
    SecurityInvalidSignature,
    SecurityRateLimitExceeded,
    SecurityUnauthorizedAccess,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::PaymentOrderCreated => "payment.order_created",
            AuditAction::PaymentCompleted => "payment.completed",
            AuditAction::PaymentFailed => "payment.failed",
            AuditAction::PaymentVerified => "payment.verified",
            AuditAction::PaymentRefunded => "payment.refunded",
            AuditAction::CreditsPurchased => "credits.purchased",
            AuditAction::CreditsUsed => "credits.used",
            AuditAction::CreditsRefunded => "credits.refunded",
            AuditAction::CreditsAdded => "credits.added",
            AuditAction::FolderCreated => "folder.created",
            AuditAction::FolderUpdated => "folder.updated",
            AuditAction::FolderDeleted => "folder.deleted",
            AuditAction::ImageMoved => "image.moved",
            AuditAction::ImageDeleted => "image.deleted",
            AuditAction::SecurityInvalidSignature => "security.invalid_signature",
            AuditAction::SecurityRateLimitExceeded => "security.rate_limit_exceeded",
            AuditAction::SecurityUnauthorizedAccess => "security.unauthorized_access",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditResource {
    User,
    Payment,
    Credit,
    Image,
    Folder,
    Session,
    Security,
}

impl AuditResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResource::User => "user",
            AuditResource::Payment => "payment",
            AuditResource::Credit => "credit",
            AuditResource::Image => "image",
            AuditResource::Folder => "folder",
            AuditResource::Session => "session",
            AuditResource::Security => "security",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Success,
    Failure,
    Error,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failure => "failure",
            AuditStatus::Error => "error",
        }
    }
}

/// Who triggered an event and from where
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub user_id: Option<Uuid>,
    pub ip_address: Option<IpNetwork>,
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Events raised by the gateway or background jobs rather than a signed-in user.
    pub fn system() -> Self {
        Self::default()
    }

    pub fn from_request(req: &HttpRequest, user_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            ip_address: client_ip_network(req),
            user_agent: user_agent(req),
        }
    }

    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_ip_address(mut self, ip_address: IpNetwork) -> Self {
        self.ip_address = Some(ip_address);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = Some(user_agent);
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub resource: AuditResource,
    pub resource_id: Option<String>,
    pub status: AuditStatus,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    pub fn new(action: AuditAction, resource: AuditResource) -> Self {
        Self {
            action,
            resource,
            resource_id: None,
            status: AuditStatus::Success,
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_resource_id(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn with_status(mut self, status: AuditStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Marks the event as an error and records the message under `metadata.error`.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.status = AuditStatus::Error;
        if !self.metadata.is_object() {
            self.metadata = serde_json::json!({});
        }
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert("error".to_string(), serde_json::Value::String(message.into()));
        }
        self
    }
}

/// Security and financial event trail. Writes are best-effort: a failed insert is
/// logged and never fails the operation being audited.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub async fn log(&self, context: &AuditContext, event: AuditEvent) {
        let entry = NewAuditLog {
            user_id: context.user_id,
            action: event.action.as_str().to_string(),
            resource_type: event.resource.as_str().to_string(),
            resource_id: event.resource_id,
            status: event.status.as_str().to_string(),
            ip_address: context.ip_address,
            user_agent: context.user_agent.clone(),
            metadata: event.metadata,
        };

        match self.store.insert(&entry).await {
            Ok(log) => debug!("Audit {} recorded for {:?} ({})", log.action, log.user_id, log.id),
            Err(e) => error!("Failed to write audit log for {}: {}", entry.action, e),
        }
    }

    pub async fn history_for(&self, resource: AuditResource, resource_id: &str) -> AppResult<Vec<AuditLog>> {
        self.store.list_for_resource(resource.as_str(), resource_id).await
    }
}
