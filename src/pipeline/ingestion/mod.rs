// Outbound request pacing

pub mod politeness;
