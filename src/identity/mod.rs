mod ids;
mod path;
mod slug;

pub use ids::{audio_id, episode_id, show_id};
pub use path::{audio_extension, object_path};
pub use slug::sanitize_title;
