pub mod format_converter;
pub mod ring_buffer;
