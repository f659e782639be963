pub mod high_risk_histories;
pub mod risk_events;
pub mod robot_components;
pub mod robot_groups;
pub mod trend_charts;
