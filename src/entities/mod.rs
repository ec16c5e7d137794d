pub mod prelude;

pub mod shares;
pub mod uploaded_files;
