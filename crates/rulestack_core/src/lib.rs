mod archive;
mod context_file;
mod install;
mod manifest;
mod pack;
mod project;
mod publish;
pub mod registry;

pub use archive::{create_archive, sha256_file, unpack_archive};
pub use context_file::regenerate_context_file;
pub use install::{InstallOutcome, PackageAction, PackageResult, add, install, parse_package_spec};
pub use manifest::{LockManifest, LockedPackage, PackageManifest, ProjectManifest};
pub use pack::{PackOutcome, PackRequest, pack};
pub use project::Project;
pub use publish::{ArchiveResult, PublishOutcome, publish, staged_archives};

pub const PROJECT_MANIFEST: &str = "rulestack.json";
pub const LOCK_MANIFEST: &str = "rulestack.lock.json";
pub const RULESTACK_DIR: &str = ".rulestack";
pub const STAGED_DIR: &str = "staged";
pub const CONTEXT_FILE: &str = "CLAUDE.md";
