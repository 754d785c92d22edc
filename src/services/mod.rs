pub mod catalog;
pub mod enrichment;
pub mod escalation;
pub mod fallback;
pub mod profile;
pub mod ranking;
pub mod recommendations;
pub mod similarity;
pub mod strategies;
