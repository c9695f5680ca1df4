// Platform players - one PlatformPlayer per kind of output surface
pub mod headless;
pub mod surface;
pub mod window;

pub use headless::HeadlessPlayer;
pub use surface::SurfacePlayer;
pub use window::WindowPlayer;
