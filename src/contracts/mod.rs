// Contracts Module - Public ABIs Only (read-only calls)

pub mod erc20;

pub use erc20::Erc20;
