/*!
 * Registry Module
 * Interfaces to external collaborators: directory service and resource registry
 */

mod directory;
mod resources;

pub use directory::{Directory, InMemoryDirectory};
pub use resources::{InMemoryResourceRegistry, Resource, ResourceRegistry};
