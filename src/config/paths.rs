//! Platform directory lookup

pub mod xdg_root;
