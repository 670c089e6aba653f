//! Host-side bench for the pulse window generators: both generators on OS threads at a slow
//! slot rate, controlled from stdin through the same interpreter as the firmware.

pub mod console;
pub mod rt;
pub mod sim;
