pub use super::shares::Entity as Shares;
pub use super::uploaded_files::Entity as UploadedFiles;
