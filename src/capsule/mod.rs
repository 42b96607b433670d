mod capsule;

pub use capsule::Capsule;
