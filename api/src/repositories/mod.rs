pub mod holding_repository;

pub use holding_repository::{
    HoldingRepository, InMemoryHoldingRepository, PostgresHoldingRepository,
};
