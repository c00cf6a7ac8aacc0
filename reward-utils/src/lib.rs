//! FOG Coin Reward Utility Functions
//!
//! ## Current API
//!
//! - Filter ad units a viewer may start
//! - Gate questions behind video playback
//! - Sequence questions and collect answers
//! - Resolve profile placeholders in question text
//! - Validate answers and calculate rewards
//! - Validate ad unit configuration
//! - Apply themes as CSS variables
//!
pub mod catalog;
pub mod eligibility;
pub mod error;
pub mod placeholder;
pub mod playback;
pub mod reward;
pub mod sequencer;
pub mod theme;
