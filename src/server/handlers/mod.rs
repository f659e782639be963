pub mod components;
pub mod dashboard;
pub mod groups;
pub mod gripper_check;
pub mod health;
pub mod histories;
pub mod imports;
pub mod legacy;
pub mod risk_events;
