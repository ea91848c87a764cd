//! Concrete hardware backends known to this build.

pub mod openrazer;
