pub mod staker_my_stakes;

pub use staker_my_stakes::StakerMyStakes;
