//! Exit codes for the pipewright CLI
//!
//! Each error kind of the pipeline gets its own code so CI jobs can tell
//! a misconfigured job from a failed release.

#![allow(dead_code)]

/// Command completed
pub const SUCCESS: i32 = 0;

/// Failure without a more specific kind (image build, I/O)
pub const ERROR: i32 = 1;

/// A required CI variable, credential or cluster configuration is absent
pub const CONFIGURATION_ERROR: i32 = 2;

/// A tag, branch name or version failed validation
pub const FORMAT_ERROR: i32 = 3;

/// Tag lookup, release history or chart fetch failed
pub const LOOKUP_ERROR: i32 = 4;

/// Chart or bundle synthesis failed
pub const SYNTHESIS_ERROR: i32 = 5;

/// Install or upgrade failed
pub const APPLY_ERROR: i32 = 6;

/// Invalid command line (following BSD sysexits convention)
pub const USAGE_ERROR: i32 = 64;
