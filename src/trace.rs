pub mod interface;
pub mod raw_trace;
pub mod vm_trace;
