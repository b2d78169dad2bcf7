pub mod architecture;
pub mod constants;
pub mod data;
pub mod discount;
pub mod inference;
pub mod optim;
pub mod region;
pub mod step;
pub mod training;
