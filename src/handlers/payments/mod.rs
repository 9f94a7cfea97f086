pub mod history_handlers;
pub mod order_handlers;
pub mod verify_handlers;
pub mod webhook_handlers;

pub use history_handlers::get_payment_history;
pub use order_handlers::create_order;
pub use verify_handlers::verify_payment;
pub use webhook_handlers::razorpay_webhook;
