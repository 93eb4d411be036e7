//! Taxi ride duration batch scoring.
//!
//! Loads the fitted duration model, scores one month of taxi trips and
//! writes the predictions.

pub mod commands;
