pub mod blob;
pub mod cleanup;
pub mod init;
pub mod run;

pub use blob::Blob;
pub use cleanup::Cleanup;
pub use init::Init;
pub use run::Run;
