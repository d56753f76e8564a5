pub mod cards;
pub mod review;
pub mod serve;
pub mod stats;
