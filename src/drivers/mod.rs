pub mod ahrs;
pub mod autopilot;
pub mod filter;
pub mod imu;
pub mod mixer;
pub mod protocol;
pub mod stabilizer;
pub mod storage;
