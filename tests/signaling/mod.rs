//! Signaling scenarios driven through the gateway and dispatcher

mod conference_tests;
mod presence_tests;
mod race_tests;
mod relay_tests;
