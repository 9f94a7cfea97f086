pub mod audit_service;
pub mod auth;
pub mod credit_service;
pub mod folder_service;
pub mod image_service;
pub mod maintenance_service;
pub mod payment_service;
pub mod razorpay_service;

pub use audit_service::AuditService;
pub use credit_service::CreditService;
pub use folder_service::FolderService;
pub use image_service::ImageService;
pub use maintenance_service::MaintenanceService;
pub use payment_service::PaymentService;
pub use razorpay_service::RazorpayService;
