/*!
 * Common test utilities for the pahedl test suite
 */

use anyhow::Result;
use tempfile::TempDir;

// Re-export the test doubles module
pub mod mocks;

// Local HTTP fixture server
pub mod fixture;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}
