//! KubeVirt API Client
//!
//! Typed access to the cluster objects the VM clone controller consumes:
//! virtual machines, snapshots and their content, restores, controller
//! revisions, persistent volume claims and storage classes. The clone
//! request's own status is also written through this client so that the
//! whole reconcile path can run against an in-memory mock.
//!
//! # Example
//!
//! ```no_run
//! use kubevirt_client::{VirtClient, VirtClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = VirtClient::new(kube::Client::try_default().await?);
//!
//! // Read a snapshot and check whether the snapshot engine finished
//! if let Some(snapshot) = client.get_snapshot("default", "tmp-snapshot-1").await? {
//!     println!("ready: {}", snapshot.is_ready());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod virt_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::VirtClient;
pub use error::VirtError;
pub use virt_trait::VirtClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockVirtClient, Operation};
