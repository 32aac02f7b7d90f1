//! SQLite-backed data store for the academy CRM.
//!
//! The assistant core only ever talks to the `DataStore` trait — the cloud
//! document database behind the production dashboard is an external
//! collaborator, and this module is the concrete implementation the binary
//! ships with. Design notes:
//!   - WAL mode so a long-lived chat REPL never blocks a second reader
//!   - natural ordering is insertion order (`ORDER BY id`), which is what the
//!     entity resolver's candidate lists preserve
//!   - every method returns the entity's current representation or a list
//!     thereof; no method performs more than one write

use std::path::Path;

use rusqlite::{params, Connection};

use crate::types::{
    CandidateRef, Course, Employee, EntityKind, FinanceSummary, KnowledgeSnippet, LedgerEntry,
    LedgerKind, MemoryFact, Payment, Priority, Student, TaskItem,
};

// ── DataStore trait ──────────────────────────────────────────────────────

pub(crate) trait DataStore {
    /// Display name + id per entity of `kind`, in natural store order.
    /// Fetched fresh by the resolver on every call.
    fn candidates(&self, kind: EntityKind) -> Result<Vec<CandidateRef>, String>;

    fn add_student(
        &self,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
        course: Option<&str>,
    ) -> Result<Student, String>;
    fn list_students(&self) -> Result<Vec<Student>, String>;
    fn update_student(
        &self,
        id: i64,
        phone: Option<&str>,
        email: Option<&str>,
        course: Option<&str>,
    ) -> Result<Student, String>;
    fn delete_student(&self, id: i64) -> Result<(), String>;
    fn append_student_note(&self, id: i64, note: &str) -> Result<Student, String>;

    fn add_employee(
        &self,
        name: &str,
        role: Option<&str>,
        phone: Option<&str>,
        salary: Option<f64>,
    ) -> Result<Employee, String>;
    fn list_employees(&self) -> Result<Vec<Employee>, String>;
    fn update_employee(
        &self,
        id: i64,
        role: Option<&str>,
        phone: Option<&str>,
        salary: Option<f64>,
    ) -> Result<Employee, String>;
    fn delete_employee(&self, id: i64) -> Result<(), String>;

    fn add_course(
        &self,
        name: &str,
        teacher: Option<&str>,
        price: Option<f64>,
        duration: Option<&str>,
    ) -> Result<Course, String>;
    fn list_courses(&self) -> Result<Vec<Course>, String>;
    fn update_course(
        &self,
        id: i64,
        teacher: Option<&str>,
        price: Option<f64>,
        duration: Option<&str>,
    ) -> Result<Course, String>;
    fn delete_course(&self, id: i64) -> Result<(), String>;

    fn add_task(
        &self,
        title: &str,
        notes: Option<&str>,
        assignee: Option<&str>,
        priority: Priority,
        due_date: &str,
    ) -> Result<TaskItem, String>;
    fn list_tasks(&self) -> Result<Vec<TaskItem>, String>;
    fn complete_task(&self, id: i64) -> Result<TaskItem, String>;
    fn delete_task(&self, id: i64) -> Result<(), String>;

    fn record_payment(
        &self,
        student_id: i64,
        amount: f64,
        method: &str,
        date: &str,
    ) -> Result<Payment, String>;
    fn list_payments(&self) -> Result<Vec<Payment>, String>;

    fn add_ledger(
        &self,
        kind: LedgerKind,
        label: &str,
        amount: f64,
        date: &str,
    ) -> Result<LedgerEntry, String>;
    fn list_ledger(&self, kind: Option<LedgerKind>) -> Result<Vec<LedgerEntry>, String>;
    fn find_ledger_by_label(
        &self,
        kind: LedgerKind,
        label: &str,
    ) -> Result<Vec<LedgerEntry>, String>;
    fn delete_ledger(&self, id: i64) -> Result<(), String>;
    fn financial_summary(&self) -> Result<FinanceSummary, String>;

    fn remember_fact(&self, text: &str, checksum: &str, created_at: &str)
        -> Result<MemoryFact, String>;
    fn memory_checksum_exists(&self, checksum: &str) -> Result<bool, String>;
    fn list_memory_facts(&self) -> Result<Vec<MemoryFact>, String>;

    fn add_knowledge(&self, title: &str, body: &str) -> Result<KnowledgeSnippet, String>;
    fn list_knowledge(&self) -> Result<Vec<KnowledgeSnippet>, String>;
}

// ── SqliteStore ──────────────────────────────────────────────────────────

pub(crate) struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub(crate) fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Err(format!("no store at {} (run `mira init` first)", path.display()).into());
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        Ok(store)
    }

    pub(crate) fn open_or_create(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.apply_pragmas()?;
        store.init_schema()?;
        Ok(store)
    }

    fn apply_pragmas(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    fn init_schema(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT,
                email TEXT,
                course TEXT,
                enrolled_at TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '[]'
            );
            CREATE TABLE IF NOT EXISTS employees (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                role TEXT,
                phone TEXT,
                salary REAL
            );
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                teacher TEXT,
                price REAL,
                duration TEXT
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                notes TEXT,
                assignee TEXT,
                priority TEXT NOT NULL,
                due_date TEXT NOT NULL,
                done INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY,
                student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
                amount REAL NOT NULL,
                method TEXT NOT NULL,
                date TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS ledger (
                id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                label TEXT NOT NULL,
                amount REAL NOT NULL,
                date TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS memory_facts (
                id INTEGER PRIMARY KEY,
                text TEXT NOT NULL,
                checksum TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS knowledge (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn row_to_student(row: &rusqlite::Row) -> Result<Student, rusqlite::Error> {
        let notes_json: String = row.get(6)?;
        Ok(Student {
            id: row.get(0)?,
            name: row.get(1)?,
            phone: row.get(2)?,
            email: row.get(3)?,
            course: row.get(4)?,
            enrolled_at: row.get(5)?,
            notes: serde_json::from_str(&notes_json).unwrap_or_default(),
        })
    }

    fn row_to_employee(row: &rusqlite::Row) -> Result<Employee, rusqlite::Error> {
        Ok(Employee {
            id: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            phone: row.get(3)?,
            salary: row.get(4)?,
        })
    }

    fn row_to_course(row: &rusqlite::Row) -> Result<Course, rusqlite::Error> {
        Ok(Course {
            id: row.get(0)?,
            name: row.get(1)?,
            teacher: row.get(2)?,
            price: row.get(3)?,
            duration: row.get(4)?,
        })
    }

    fn row_to_task(row: &rusqlite::Row) -> Result<TaskItem, rusqlite::Error> {
        let priority: String = row.get(4)?;
        let done: i64 = row.get(6)?;
        Ok(TaskItem {
            id: row.get(0)?,
            title: row.get(1)?,
            notes: row.get(2)?,
            assignee: row.get(3)?,
            priority: Priority::from_arg(&priority),
            due_date: row.get(5)?,
            done: done != 0,
        })
    }

    fn row_to_ledger(row: &rusqlite::Row) -> Result<LedgerEntry, rusqlite::Error> {
        let kind: String = row.get(1)?;
        Ok(LedgerEntry {
            id: row.get(0)?,
            kind: LedgerKind::from_db_str(&kind),
            label: row.get(2)?,
            amount: row.get(3)?,
            date: row.get(4)?,
        })
    }

    fn fetch_student(&self, id: i64) -> Result<Student, String> {
        self.conn
            .query_row(
                "SELECT id, name, phone, email, course, enrolled_at, notes
                 FROM students WHERE id = ?1",
                params![id],
                Self::row_to_student,
            )
            .map_err(|e| format!("student {id}: {e}"))
    }

    fn fetch_employee(&self, id: i64) -> Result<Employee, String> {
        self.conn
            .query_row(
                "SELECT id, name, role, phone, salary FROM employees WHERE id = ?1",
                params![id],
                Self::row_to_employee,
            )
            .map_err(|e| format!("employee {id}: {e}"))
    }

    fn fetch_course(&self, id: i64) -> Result<Course, String> {
        self.conn
            .query_row(
                "SELECT id, name, teacher, price, duration FROM courses WHERE id = ?1",
                params![id],
                Self::row_to_course,
            )
            .map_err(|e| format!("course {id}: {e}"))
    }

    fn fetch_task(&self, id: i64) -> Result<TaskItem, String> {
        self.conn
            .query_row(
                "SELECT id, title, notes, assignee, priority, due_date, done
                 FROM tasks WHERE id = ?1",
                params![id],
                Self::row_to_task,
            )
            .map_err(|e| format!("task {id}: {e}"))
    }
}

impl DataStore for SqliteStore {
    fn candidates(&self, kind: EntityKind) -> Result<Vec<CandidateRef>, String> {
        let sql = match kind {
            EntityKind::Student => "SELECT id, name FROM students ORDER BY id",
            EntityKind::Employee => "SELECT id, name FROM employees ORDER BY id",
            EntityKind::Course => "SELECT id, name FROM courses ORDER BY id",
            EntityKind::Task => "SELECT id, title FROM tasks ORDER BY id",
        };
        let mut stmt = self.conn.prepare(sql).map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CandidateRef {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    fn add_student(
        &self,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
        course: Option<&str>,
    ) -> Result<Student, String> {
        self.conn
            .execute(
                "INSERT INTO students (name, phone, email, course, enrolled_at, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, '[]')",
                params![name, phone, email, course, crate::util::today_string()],
            )
            .map_err(|e| e.to_string())?;
        self.fetch_student(self.conn.last_insert_rowid())
    }

    fn list_students(&self) -> Result<Vec<Student>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, phone, email, course, enrolled_at, notes
                 FROM students ORDER BY id",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt.query_map([], Self::row_to_student).map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    fn update_student(
        &self,
        id: i64,
        phone: Option<&str>,
        email: Option<&str>,
        course: Option<&str>,
    ) -> Result<Student, String> {
        self.conn
            .execute(
                "UPDATE students SET
                    phone = COALESCE(?1, phone),
                    email = COALESCE(?2, email),
                    course = COALESCE(?3, course)
                 WHERE id = ?4",
                params![phone, email, course, id],
            )
            .map_err(|e| e.to_string())?;
        self.fetch_student(id)
    }

    fn delete_student(&self, id: i64) -> Result<(), String> {
        self.conn
            .execute("DELETE FROM students WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn append_student_note(&self, id: i64, note: &str) -> Result<Student, String> {
        let mut student = self.fetch_student(id)?;
        student.notes.push(note.to_string());
        let notes_json = serde_json::to_string(&student.notes).map_err(|e| e.to_string())?;
        self.conn
            .execute(
                "UPDATE students SET notes = ?1 WHERE id = ?2",
                params![notes_json, id],
            )
            .map_err(|e| e.to_string())?;
        Ok(student)
    }

    fn add_employee(
        &self,
        name: &str,
        role: Option<&str>,
        phone: Option<&str>,
        salary: Option<f64>,
    ) -> Result<Employee, String> {
        self.conn
            .execute(
                "INSERT INTO employees (name, role, phone, salary) VALUES (?1, ?2, ?3, ?4)",
                params![name, role, phone, salary],
            )
            .map_err(|e| e.to_string())?;
        self.fetch_employee(self.conn.last_insert_rowid())
    }

    fn list_employees(&self) -> Result<Vec<Employee>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, role, phone, salary FROM employees ORDER BY id")
            .map_err(|e| e.to_string())?;
        let rows = stmt.query_map([], Self::row_to_employee).map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    fn update_employee(
        &self,
        id: i64,
        role: Option<&str>,
        phone: Option<&str>,
        salary: Option<f64>,
    ) -> Result<Employee, String> {
        self.conn
            .execute(
                "UPDATE employees SET
                    role = COALESCE(?1, role),
                    phone = COALESCE(?2, phone),
                    salary = COALESCE(?3, salary)
                 WHERE id = ?4",
                params![role, phone, salary, id],
            )
            .map_err(|e| e.to_string())?;
        self.fetch_employee(id)
    }

    fn delete_employee(&self, id: i64) -> Result<(), String> {
        self.conn
            .execute("DELETE FROM employees WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn add_course(
        &self,
        name: &str,
        teacher: Option<&str>,
        price: Option<f64>,
        duration: Option<&str>,
    ) -> Result<Course, String> {
        self.conn
            .execute(
                "INSERT INTO courses (name, teacher, price, duration) VALUES (?1, ?2, ?3, ?4)",
                params![name, teacher, price, duration],
            )
            .map_err(|e| e.to_string())?;
        self.fetch_course(self.conn.last_insert_rowid())
    }

    fn list_courses(&self) -> Result<Vec<Course>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, teacher, price, duration FROM courses ORDER BY id")
            .map_err(|e| e.to_string())?;
        let rows = stmt.query_map([], Self::row_to_course).map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    fn update_course(
        &self,
        id: i64,
        teacher: Option<&str>,
        price: Option<f64>,
        duration: Option<&str>,
    ) -> Result<Course, String> {
        self.conn
            .execute(
                "UPDATE courses SET
                    teacher = COALESCE(?1, teacher),
                    price = COALESCE(?2, price),
                    duration = COALESCE(?3, duration)
                 WHERE id = ?4",
                params![teacher, price, duration, id],
            )
            .map_err(|e| e.to_string())?;
        self.fetch_course(id)
    }

    fn delete_course(&self, id: i64) -> Result<(), String> {
        self.conn
            .execute("DELETE FROM courses WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn add_task(
        &self,
        title: &str,
        notes: Option<&str>,
        assignee: Option<&str>,
        priority: Priority,
        due_date: &str,
    ) -> Result<TaskItem, String> {
        self.conn
            .execute(
                "INSERT INTO tasks (title, notes, assignee, priority, due_date, done)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![title, notes, assignee, priority.as_str(), due_date],
            )
            .map_err(|e| e.to_string())?;
        self.fetch_task(self.conn.last_insert_rowid())
    }

    fn list_tasks(&self) -> Result<Vec<TaskItem>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, notes, assignee, priority, due_date, done
                 FROM tasks ORDER BY id",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt.query_map([], Self::row_to_task).map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    fn complete_task(&self, id: i64) -> Result<TaskItem, String> {
        self.conn
            .execute("UPDATE tasks SET done = 1 WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        self.fetch_task(id)
    }

    fn delete_task(&self, id: i64) -> Result<(), String> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn record_payment(
        &self,
        student_id: i64,
        amount: f64,
        method: &str,
        date: &str,
    ) -> Result<Payment, String> {
        self.conn
            .execute(
                "INSERT INTO payments (student_id, amount, method, date)
                 VALUES (?1, ?2, ?3, ?4)",
                params![student_id, amount, method, date],
            )
            .map_err(|e| e.to_string())?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, student_id, amount, method, date FROM payments WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Payment {
                        id: row.get(0)?,
                        student_id: row.get(1)?,
                        amount: row.get(2)?,
                        method: row.get(3)?,
                        date: row.get(4)?,
                    })
                },
            )
            .map_err(|e| e.to_string())
    }

    fn list_payments(&self) -> Result<Vec<Payment>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, student_id, amount, method, date FROM payments ORDER BY id")
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Payment {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    amount: row.get(2)?,
                    method: row.get(3)?,
                    date: row.get(4)?,
                })
            })
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    fn add_ledger(
        &self,
        kind: LedgerKind,
        label: &str,
        amount: f64,
        date: &str,
    ) -> Result<LedgerEntry, String> {
        self.conn
            .execute(
                "INSERT INTO ledger (kind, label, amount, date) VALUES (?1, ?2, ?3, ?4)",
                params![kind.as_str(), label, amount, date],
            )
            .map_err(|e| e.to_string())?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, kind, label, amount, date FROM ledger WHERE id = ?1",
                params![id],
                Self::row_to_ledger,
            )
            .map_err(|e| e.to_string())
    }

    fn list_ledger(&self, kind: Option<LedgerKind>) -> Result<Vec<LedgerEntry>, String> {
        let (sql, bind): (&str, Vec<String>) = match kind {
            Some(k) => (
                "SELECT id, kind, label, amount, date FROM ledger WHERE kind = ?1 ORDER BY id",
                vec![k.as_str().to_string()],
            ),
            None => (
                "SELECT id, kind, label, amount, date FROM ledger ORDER BY id",
                Vec::new(),
            ),
        };
        let mut stmt = self.conn.prepare(sql).map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(bind.iter()), Self::row_to_ledger)
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    fn find_ledger_by_label(
        &self,
        kind: LedgerKind,
        label: &str,
    ) -> Result<Vec<LedgerEntry>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, kind, label, amount, date FROM ledger
                 WHERE kind = ?1 AND label = ?2 COLLATE NOCASE ORDER BY id",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![kind.as_str(), label], Self::row_to_ledger)
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    fn delete_ledger(&self, id: i64) -> Result<(), String> {
        self.conn
            .execute("DELETE FROM ledger WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn financial_summary(&self) -> Result<FinanceSummary, String> {
        let sum = |sql: &str| -> Result<f64, String> {
            self.conn
                .query_row(sql, [], |row| row.get::<_, Option<f64>>(0))
                .map(|v| v.unwrap_or(0.0))
                .map_err(|e| e.to_string())
        };
        let income_total = sum("SELECT SUM(amount) FROM ledger WHERE kind = 'income'")?;
        let expense_total = sum("SELECT SUM(amount) FROM ledger WHERE kind = 'expense'")?;
        let payments_total = sum("SELECT SUM(amount) FROM payments")?;
        Ok(FinanceSummary {
            income_total,
            payments_total,
            expense_total,
            net: income_total + payments_total - expense_total,
        })
    }

    fn remember_fact(
        &self,
        text: &str,
        checksum: &str,
        created_at: &str,
    ) -> Result<MemoryFact, String> {
        self.conn
            .execute(
                "INSERT INTO memory_facts (text, checksum, created_at) VALUES (?1, ?2, ?3)",
                params![text, checksum, created_at],
            )
            .map_err(|e| e.to_string())?;
        Ok(MemoryFact {
            id: self.conn.last_insert_rowid(),
            text: text.to_string(),
            checksum: checksum.to_string(),
            created_at: created_at.to_string(),
        })
    }

    fn memory_checksum_exists(&self, checksum: &str) -> Result<bool, String> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM memory_facts WHERE checksum = ?1",
                params![checksum],
                |row| row.get(0),
            )
            .map_err(|e| e.to_string())?;
        Ok(count > 0)
    }

    fn list_memory_facts(&self) -> Result<Vec<MemoryFact>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, text, checksum, created_at FROM memory_facts ORDER BY id")
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MemoryFact {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    checksum: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    fn add_knowledge(&self, title: &str, body: &str) -> Result<KnowledgeSnippet, String> {
        self.conn
            .execute(
                "INSERT INTO knowledge (title, body) VALUES (?1, ?2)",
                params![title, body],
            )
            .map_err(|e| e.to_string())?;
        Ok(KnowledgeSnippet {
            id: self.conn.last_insert_rowid(),
            title: title.to_string(),
            body: body.to_string(),
        })
    }

    fn list_knowledge(&self) -> Result<Vec<KnowledgeSnippet>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, body FROM knowledge ORDER BY id")
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map([], |row| {
                Ok(KnowledgeSnippet {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    body: row.get(2)?,
                })
            })
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    pub(crate) fn temp_store(name: &str) -> (SqliteStore, PathBuf) {
        let dir = std::env::temp_dir().join("mira_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("store_{}_{name}.sqlite", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let store = SqliteStore::open_or_create(&path).unwrap();
        (store, path)
    }

    #[test]
    fn test_student_crud_roundtrip() {
        let (store, path) = temp_store("student_crud");

        let s = store
            .add_student("Olena Ivanova", Some("+380501112233"), None, Some("Rust Basics"))
            .unwrap();
        assert_eq!(s.name, "Olena Ivanova");
        assert!(s.notes.is_empty());

        let updated = store
            .update_student(s.id, None, Some("olena@example.com"), None)
            .unwrap();
        // COALESCE keeps fields that were not provided
        assert_eq!(updated.phone.as_deref(), Some("+380501112233"));
        assert_eq!(updated.email.as_deref(), Some("olena@example.com"));

        let noted = store.append_student_note(s.id, "prefers evening group").unwrap();
        assert_eq!(noted.notes, vec!["prefers evening group".to_string()]);

        store.delete_student(s.id).unwrap();
        assert!(store.list_students().unwrap().is_empty());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_candidates_keep_insertion_order() {
        let (store, path) = temp_store("candidate_order");
        store.add_student("Zoe", None, None, None).unwrap();
        store.add_student("Adam", None, None, None).unwrap();
        store.add_student("Mila", None, None, None).unwrap();

        let names: Vec<String> = store
            .candidates(EntityKind::Student)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        // natural (insertion) order, never re-sorted
        assert_eq!(names, vec!["Zoe", "Adam", "Mila"]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_financial_summary_combines_sources() {
        let (store, path) = temp_store("fin_summary");
        let s = store.add_student("Ira", None, None, None).unwrap();
        store.record_payment(s.id, 250.0, "Cash", "2026-08-01").unwrap();
        store
            .add_ledger(LedgerKind::Income, "Workshop tickets", 100.0, "2026-08-02")
            .unwrap();
        store
            .add_ledger(LedgerKind::Expense, "Projector rent", 80.0, "2026-08-03")
            .unwrap();

        let summary = store.financial_summary().unwrap();
        assert_eq!(summary.income_total, 100.0);
        assert_eq!(summary.payments_total, 250.0);
        assert_eq!(summary.expense_total, 80.0);
        assert_eq!(summary.net, 270.0);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_financial_summary_empty_store_is_zero() {
        let (store, path) = temp_store("fin_empty");
        let summary = store.financial_summary().unwrap();
        assert_eq!(summary.net, 0.0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_memory_checksum_lookup() {
        let (store, path) = temp_store("memory");
        assert!(!store.memory_checksum_exists("abc").unwrap());
        store.remember_fact("Director prefers Friday reports", "abc", "2026-08-06").unwrap();
        assert!(store.memory_checksum_exists("abc").unwrap());
        assert_eq!(store.list_memory_facts().unwrap().len(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_ledger_label_lookup_is_case_insensitive() {
        let (store, path) = temp_store("ledger_label");
        store
            .add_ledger(LedgerKind::Expense, "Office Rent", 500.0, "2026-08-01")
            .unwrap();
        let hits = store.find_ledger_by_label(LedgerKind::Expense, "office rent").unwrap();
        assert_eq!(hits.len(), 1);
        let miss = store.find_ledger_by_label(LedgerKind::Income, "office rent").unwrap();
        assert!(miss.is_empty());
        std::fs::remove_file(&path).ok();
    }
}
