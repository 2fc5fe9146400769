/// UI module exports
pub mod components;
pub mod frame_host;
pub mod panel;
