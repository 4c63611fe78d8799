//! Domain entity definitions.

mod avatar;
mod identity;
mod initials;

pub use avatar::{AvatarImage, AvatarSource, ChainOutcome, Resolution, SVG_MIME_TYPE};
pub use identity::{DEFAULT_PUBLIC_DOMAINS, Identity, PublicDomains};
pub use initials::{AvatarColor, Initials, Oklch};
