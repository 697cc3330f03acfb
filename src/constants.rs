//! Action names, local-store keys, and defaults shared across plugins.

/// Reserved action used by every plugin's `start` edge out of the empty
/// pre-start state.
pub const ACTION_START: &str = "START";

/// Local-store key holding the form data accepted by a submission.
pub const LOCAL_KEY_FORM_DATA: &str = "formData";

/// Local-store key holding form data prepopulated from the global context.
pub const LOCAL_KEY_PREPOPULATED_FORM_DATA: &str = "prepopulatedFormData";

/// JSON Schema extension naming the global-context dot path a form property
/// is prepopulated from.
pub const GLOBAL_CONTEXT_SCHEMA_KEY: &str = "x-globalContext";

/// Path appended to the service URL advertised to external reviewers.
pub const TASKS_API_PATH: &str = "/api/tasks";

/// Default capacity of the bounded notification channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 100;
