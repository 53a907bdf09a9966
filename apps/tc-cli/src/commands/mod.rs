pub mod goal;
pub mod temp;
