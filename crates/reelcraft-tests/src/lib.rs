//! Integration test crate for Reelcraft.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! Shared fixtures live in `fixtures`; the test modules follow the
//! pipeline from caching through playback to export.

#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod cache;

#[cfg(test)]
mod scene;

#[cfg(test)]
mod playback;

#[cfg(test)]
mod export;
