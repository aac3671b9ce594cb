mod order_nsu;

pub use order_nsu::new_order_nsu;
