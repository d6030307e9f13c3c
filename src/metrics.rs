pub mod collector;
pub mod dispersion;
pub mod printer;
