pub mod pending_payment_monitor;
