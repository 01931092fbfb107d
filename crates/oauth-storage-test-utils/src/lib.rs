// oauth-storage-test-utils: conformance testing for storage backends.
//
// - `conformance` holds one async check per storage property, each generic
//   over the narrowest capability it exercises
// - `test_suite` runs the checks in order, logging and timing each one
//
// Run against a fresh, empty backend instance: the signing-key and scope
// checks assume no global records exist yet.

pub mod conformance;
pub mod test_suite;

pub use conformance::FullStorage;
pub use test_suite::{run_conformance, SuiteStats, TestLogger, TestSuite};
