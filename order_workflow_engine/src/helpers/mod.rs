pub mod order_id;

pub use order_id::{format_order_id, order_id_period};
