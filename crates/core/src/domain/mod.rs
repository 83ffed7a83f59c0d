pub mod address;
pub mod checkout;
pub mod conversation;
pub mod intent;
pub mod product;
