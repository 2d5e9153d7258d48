mod builder;
mod container;
mod extractor;

pub use builder::ContainerBuilder;
pub use container::{Container, Resolvable};
pub use extractor::{HasContainer, Inject};
