pub mod detection;
pub mod features;
pub mod frame_summary;
pub mod identity;
pub mod ingest;
pub mod kinematics;
pub mod possession;
pub mod trajectory;
