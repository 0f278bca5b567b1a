mod config;
mod date_source;
mod executor;
mod exif_reader;
mod format;
mod planner;
mod resolver;

pub use config::{
    app_paths, load_config, read_config_file, AppPaths, Config, ConfigError, ConfigSettings,
    CONFIG_PATH_ENV, DATE_SECTION, DEFAULT_DATE_FORMAT, DEFAULT_DATE_SOURCE, EXECUTION_SECTION,
    STATE_DIR_ENV,
};
pub use date_source::{
    parse_date_sources, read_from_source, read_timestamp, DateError, DateSource,
    UnknownDateSource,
};
pub use executor::{
    execute_plan, persist_undo, renamer_for, undo_last, CommandRenamer, ErrorAction, ErrorPrompt,
    ExecutionReport, ExecutionResult, ExecutionStatus, FsRenamer, RenameError, RenameOperation,
    Renamer, UndoResult,
};
pub use exif_reader::read_exif_date;
pub use format::{format_name, matches_timestamp, DateFormat, FormatError};
pub use planner::{
    generate_plan, PlanOptions, PlanStep, RenameCandidate, RenamePlan, RenameStats, SkippedFile,
};
pub use resolver::{resolve_name, ClaimedNames, CollisionExhausted, DEFAULT_DISAMBIGUATOR_LIMIT};
