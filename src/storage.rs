pub mod directory;
mod records;

pub use directory::{
    AddPersonError, Directory, DirectoryLoadError, InitError, Loaded, PersistError,
    RemoveUnitError, SaveUnitError, Unloaded,
};
pub use records::{
    AssignmentRecord, LevelRecord, PersonRecord, QualificationRecord, UnitRecord,
};
