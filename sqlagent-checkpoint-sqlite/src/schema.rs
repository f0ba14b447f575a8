pub const CREATE_CHECKPOINTS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS checkpoints (\
    thread_id TEXT NOT NULL,\
    seq INTEGER NOT NULL,\
    created_at TEXT NOT NULL,\
    node TEXT,\
    next_node TEXT,\
    step INTEGER,\
    state_json TEXT NOT NULL,\
    PRIMARY KEY (thread_id, seq)\
)";

pub const MIGRATION_STATEMENTS_SQL: [&str; 1] = [CREATE_CHECKPOINTS_TABLE_SQL];
