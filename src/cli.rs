pub mod amf;
pub mod command;
pub mod info;
pub mod mux;
