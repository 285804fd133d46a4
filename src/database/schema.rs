// SQLite schema for the tutor runtime. Every statement is idempotent so the
// whole set can be applied on each startup.

pub const CREATE_TABLES: &[&str] = &[
    // Chat sessions, one per (user, context type, context id).
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        context_type TEXT NOT NULL,
        context_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE (user_id, context_type, context_id)
    )
    "#,
    // Persisted transcript. `sequence` orders messages within a session.
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        message_id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        component TEXT,
        timestamp INTEGER NOT NULL,
        UNIQUE (session_id, sequence)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_messages_session ON messages (session_id, sequence)
    "#,
    // Idempotency ledger for tool handlers. A replayed invocation id returns
    // the stored result instead of re-running the handler.
    r#"
    CREATE TABLE IF NOT EXISTS tool_invocations (
        invocation_id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        tool_name TEXT NOT NULL,
        result TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS learning_paths (
        path_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        category TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (path_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS learning_nodes (
        node_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        difficulty TEXT NOT NULL,
        estimated_duration_minutes INTEGER NOT NULL,
        prerequisites TEXT NOT NULL,
        concepts TEXT NOT NULL,
        learning_objectives TEXT NOT NULL,
        created_for_user TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS exercises (
        exercise_id TEXT PRIMARY KEY,
        node_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        prompt TEXT NOT NULL,
        exercise_type TEXT NOT NULL,
        difficulty TEXT NOT NULL,
        starter_code TEXT NOT NULL,
        solution TEXT,
        hints TEXT NOT NULL,
        created_for_user TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    // Generated lecture content, stored as serialized JSON sections.
    r#"
    CREATE TABLE IF NOT EXISTS learning_content (
        content_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        node_id TEXT NOT NULL,
        title TEXT NOT NULL,
        content_type TEXT NOT NULL,
        sections TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS submissions (
        submission_id TEXT PRIMARY KEY,
        exercise_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        code TEXT NOT NULL,
        language TEXT NOT NULL,
        attempt_number INTEGER NOT NULL,
        status TEXT NOT NULL,
        verdict TEXT,
        outcome TEXT,
        next_action TEXT,
        created_at INTEGER NOT NULL,
        graded_at INTEGER
    )
    "#,
    // Audit trail of submission status transitions, including repeated
    // in-flight ticks observed while polling.
    r#"
    CREATE TABLE IF NOT EXISTS submission_events (
        event_id INTEGER PRIMARY KEY AUTOINCREMENT,
        submission_id TEXT NOT NULL,
        status TEXT NOT NULL,
        recorded_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_submission_events ON submission_events (submission_id, event_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS node_progress (
        user_id TEXT NOT NULL,
        node_id TEXT NOT NULL,
        status TEXT NOT NULL,
        current_step INTEGER NOT NULL,
        completion_percentage INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, node_id)
    )
    "#,
    // Per-exercise attempt and hint counters for the hint ladder.
    r#"
    CREATE TABLE IF NOT EXISTS hint_state (
        user_id TEXT NOT NULL,
        exercise_id TEXT NOT NULL,
        attempts INTEGER NOT NULL,
        hints_used INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, exercise_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_profiles (
        user_id TEXT PRIMARY KEY,
        experience_level TEXT NOT NULL,
        learning_style TEXT NOT NULL,
        learning_goals TEXT NOT NULL,
        weak_points TEXT NOT NULL,
        total_exercises_completed INTEGER NOT NULL,
        total_exercises_failed INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
];
