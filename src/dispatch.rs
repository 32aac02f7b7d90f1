//! Tool dispatch. Maps a model-issued call to exactly one store operation
//! and folds the outcome into a response envelope. The registry is a plain
//! name→handler table built once at startup; by-name operations go through
//! the entity resolver and mutate only on an unambiguous hit. This module is
//! the only place in the core that writes to the data store.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::resolver;
use crate::store::DataStore;
use crate::tool_args::{
    AddCourseArgs, AddEmployeeArgs, AddLedgerArgs, AddStudentArgs, AddStudentNoteArgs,
    AddTaskArgs, DeleteCourseArgs, DeleteEmployeeArgs, DeleteLedgerArgs, DeleteStudentArgs,
    EnrollStudentArgs, ListLedgerArgs, RecordPaymentArgs, RememberFactArgs, TaskByTitleArgs,
    UpdateCourseArgs, UpdateEmployeeArgs, UpdateStudentArgs,
};
use crate::types::{
    CandidateRef, EntityKind, LedgerKind, PaymentMethod, Priority, ResolutionOutcome, ToolCall,
    ToolResponse,
};
use crate::util::{blake3_hash, today_string};

pub(crate) type ToolHandler = fn(&dyn DataStore, Value) -> Result<Value, String>;

pub(crate) struct ToolRegistry {
    handlers: HashMap<&'static str, ToolHandler>,
}

impl ToolRegistry {
    pub(crate) fn new() -> Self {
        let mut handlers: HashMap<&'static str, ToolHandler> = HashMap::new();
        handlers.insert("rememberFact", remember_fact);
        handlers.insert("addStudent", add_student);
        handlers.insert("listStudents", list_students);
        handlers.insert("updateStudent", update_student);
        handlers.insert("deleteStudent", delete_student);
        handlers.insert("enrollStudent", enroll_student);
        handlers.insert("recordPayment", record_payment);
        handlers.insert("addStudentNote", add_student_note);
        handlers.insert("addTask", add_task);
        handlers.insert("listTasks", list_tasks);
        handlers.insert("completeTask", complete_task);
        handlers.insert("deleteTask", delete_task);
        handlers.insert("addEmployee", add_employee);
        handlers.insert("listEmployees", list_employees);
        handlers.insert("updateEmployee", update_employee);
        handlers.insert("deleteEmployee", delete_employee);
        handlers.insert("addCourse", add_course);
        handlers.insert("listCourses", list_courses);
        handlers.insert("updateCourse", update_course);
        handlers.insert("deleteCourse", delete_course);
        handlers.insert("addIncome", add_income);
        handlers.insert("addExpense", add_expense);
        handlers.insert("deleteIncome", delete_income);
        handlers.insert("deleteExpense", delete_expense);
        handlers.insert("listLedger", list_ledger);
        handlers.insert("financialSummary", financial_summary);
        Self { handlers }
    }

    pub(crate) fn handler(&self, name: &str) -> Option<ToolHandler> {
        self.handlers.get(name).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }
}

/// Run a batch of calls sequentially, in order, one response per call that
/// carries a non-empty id. A call the registry does not know yields a
/// success envelope describing the problem; a handler failure yields an
/// error envelope. Neither aborts the batch.
pub(crate) fn dispatch(
    registry: &ToolRegistry,
    store: &dyn DataStore,
    calls: &[ToolCall],
) -> Vec<ToolResponse> {
    let mut responses = Vec::with_capacity(calls.len());
    for call in calls {
        if call.id.trim().is_empty() {
            eprintln!("[dispatch] dropping {} call without an id", call.name);
            continue;
        }
        let Some(handler) = registry.handler(&call.name) else {
            responses.push(ToolResponse::ok(
                &call.id,
                &call.name,
                json!({ "error": "Unknown function" }),
            ));
            continue;
        };
        match handler(store, call.args.clone()) {
            Ok(result) => responses.push(ToolResponse::ok(&call.id, &call.name, result)),
            Err(err) => responses.push(ToolResponse::failed(
                &call.id,
                &call.name,
                format!("Function execution failed: {err}"),
            )),
        }
    }
    responses
}

// ── Shared helpers ───────────────────────────────────────────────────────

fn decode<T: DeserializeOwned>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("args: {e}"))
}

fn not_found_payload(kind: EntityKind, query: &str) -> Value {
    json!({ "message": format!("No {} matching \"{query}\" was found.", kind.noun()) })
}

fn suggestions_payload(kind: EntityKind, query: &str, candidates: Vec<CandidateRef>) -> Value {
    json!({
        "message": format!(
            "Several {}s match \"{query}\" — which one did you mean?",
            kind.noun()
        ),
        "suggestions": candidates,
    })
}

enum Resolved {
    Hit(CandidateRef),
    /// Resolution did not land on exactly one entity; the payload already
    /// carries the user-facing message (and suggestions, when ambiguous).
    /// Nothing may be mutated on this path.
    Reply(Value),
}

fn resolve_or_reply(
    store: &dyn DataStore,
    kind: EntityKind,
    query: &str,
) -> Result<Resolved, String> {
    Ok(match resolver::resolve(store, kind, query)? {
        ResolutionOutcome::Found(hit) => Resolved::Hit(hit),
        ResolutionOutcome::NotFound => Resolved::Reply(not_found_payload(kind, query)),
        ResolutionOutcome::Ambiguous(candidates) => {
            Resolved::Reply(suggestions_payload(kind, query, candidates))
        }
    })
}

fn name_list(names: &[String]) -> String {
    const SHOWN: usize = 10;
    let mut line = names.iter().take(SHOWN).cloned().collect::<Vec<_>>().join(", ");
    if names.len() > SHOWN {
        line.push_str(&format!(" and {} more", names.len() - SHOWN));
    }
    line
}

// ── Memory ───────────────────────────────────────────────────────────────

fn remember_fact(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: RememberFactArgs = decode(args)?;
    let fact = parsed.fact.trim().to_string();
    if fact.is_empty() {
        return Ok(json!({ "message": "There was nothing to remember." }));
    }
    let checksum = blake3_hash(fact.as_bytes()).to_hex().to_string();
    if store.memory_checksum_exists(&checksum)? {
        return Ok(json!({ "message": format!("Already noted: {fact}") }));
    }
    store.remember_fact(&fact, &checksum, &today_string())?;
    Ok(json!({ "message": format!("I'll remember that: {fact}") }))
}

// ── Students ─────────────────────────────────────────────────────────────

fn add_student(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: AddStudentArgs = decode(args)?;
    let student = store.add_student(
        parsed.name.trim(),
        parsed.phone.as_deref(),
        parsed.email.as_deref(),
        parsed.course_name.as_deref(),
    )?;
    Ok(json!({
        "message": format!("Student {} was added.", student.name),
        "student": student,
    }))
}

fn list_students(store: &dyn DataStore, _args: Value) -> Result<Value, String> {
    let students = store.list_students()?;
    let names: Vec<String> = students.iter().map(|s| s.name.clone()).collect();
    let message = if names.is_empty() {
        "There are no registered students.".to_string()
    } else {
        format!("{} student(s): {}", names.len(), name_list(&names))
    };
    Ok(json!({ "message": message, "students": students }))
}

fn update_student(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: UpdateStudentArgs = decode(args)?;
    match resolve_or_reply(store, EntityKind::Student, &parsed.name)? {
        Resolved::Reply(payload) => Ok(payload),
        Resolved::Hit(hit) => {
            let student = store.update_student(
                hit.id,
                parsed.phone.as_deref(),
                parsed.email.as_deref(),
                parsed.course_name.as_deref(),
            )?;
            Ok(json!({
                "message": format!("Student {} was updated.", student.name),
                "student": student,
            }))
        }
    }
}

fn delete_student(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: DeleteStudentArgs = decode(args)?;
    match resolve_or_reply(store, EntityKind::Student, &parsed.name)? {
        Resolved::Reply(payload) => Ok(payload),
        Resolved::Hit(hit) => {
            store.delete_student(hit.id)?;
            Ok(json!({ "message": format!("Student {} was removed.", hit.name) }))
        }
    }
}

fn enroll_student(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: EnrollStudentArgs = decode(args)?;
    let student = match resolve_or_reply(store, EntityKind::Student, &parsed.student_name)? {
        Resolved::Reply(payload) => return Ok(payload),
        Resolved::Hit(hit) => hit,
    };
    let course = match resolve_or_reply(store, EntityKind::Course, &parsed.course_name)? {
        Resolved::Reply(payload) => return Ok(payload),
        Resolved::Hit(hit) => hit,
    };
    store.update_student(student.id, None, None, Some(&course.name))?;
    Ok(json!({
        "message": format!("{} was enrolled in {}.", student.name, course.name),
    }))
}

fn record_payment(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: RecordPaymentArgs = decode(args)?;
    match resolve_or_reply(store, EntityKind::Student, &parsed.student_name)? {
        Resolved::Reply(payload) => Ok(payload),
        Resolved::Hit(hit) => {
            let method = parsed
                .method
                .as_deref()
                .map(PaymentMethod::from_arg)
                .unwrap_or(PaymentMethod::Cash);
            let payment =
                store.record_payment(hit.id, parsed.amount, method.as_str(), &today_string())?;
            Ok(json!({
                "message": format!(
                    "Recorded a {:.2} payment ({}) from {}.",
                    payment.amount, payment.method, hit.name
                ),
                "payment": payment,
            }))
        }
    }
}

fn add_student_note(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: AddStudentNoteArgs = decode(args)?;
    match resolve_or_reply(store, EntityKind::Student, &parsed.student_name)? {
        Resolved::Reply(payload) => Ok(payload),
        Resolved::Hit(hit) => {
            store.append_student_note(hit.id, parsed.note.trim())?;
            Ok(json!({ "message": format!("Note added to {}.", hit.name) }))
        }
    }
}

// ── Tasks ────────────────────────────────────────────────────────────────

fn add_task(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: AddTaskArgs = decode(args)?;
    let priority = parsed
        .priority
        .as_deref()
        .map(Priority::from_arg)
        .unwrap_or_default();
    let due_date = parsed.due_date.unwrap_or_else(today_string);
    let task = store.add_task(
        parsed.title.trim(),
        parsed.notes.as_deref(),
        parsed.assignee.as_deref(),
        priority,
        &due_date,
    )?;
    Ok(json!({
        "message": format!(
            "Task \"{}\" was created ({} priority, due {}).",
            task.title,
            task.priority.as_str(),
            task.due_date
        ),
        "task": task,
    }))
}

fn list_tasks(store: &dyn DataStore, _args: Value) -> Result<Value, String> {
    let tasks = store.list_tasks()?;
    let open = tasks.iter().filter(|t| !t.done).count();
    let message = if tasks.is_empty() {
        "There are no tasks.".to_string()
    } else {
        format!("{} task(s), {open} open.", tasks.len())
    };
    Ok(json!({ "message": message, "tasks": tasks }))
}

fn complete_task(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: TaskByTitleArgs = decode(args)?;
    match resolve_or_reply(store, EntityKind::Task, &parsed.title)? {
        Resolved::Reply(payload) => Ok(payload),
        Resolved::Hit(hit) => {
            store.complete_task(hit.id)?;
            Ok(json!({ "message": format!("Task \"{}\" is marked as done.", hit.name) }))
        }
    }
}

fn delete_task(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: TaskByTitleArgs = decode(args)?;
    match resolve_or_reply(store, EntityKind::Task, &parsed.title)? {
        Resolved::Reply(payload) => Ok(payload),
        Resolved::Hit(hit) => {
            store.delete_task(hit.id)?;
            Ok(json!({ "message": format!("Task \"{}\" was deleted.", hit.name) }))
        }
    }
}

// ── Employees ────────────────────────────────────────────────────────────

fn add_employee(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: AddEmployeeArgs = decode(args)?;
    let employee = store.add_employee(
        parsed.name.trim(),
        parsed.role.as_deref(),
        parsed.phone.as_deref(),
        parsed.salary,
    )?;
    Ok(json!({
        "message": format!("Employee {} was added.", employee.name),
        "employee": employee,
    }))
}

fn list_employees(store: &dyn DataStore, _args: Value) -> Result<Value, String> {
    let employees = store.list_employees()?;
    let names: Vec<String> = employees.iter().map(|e| e.name.clone()).collect();
    let message = if names.is_empty() {
        "There are no employees on record.".to_string()
    } else {
        format!("{} employee(s): {}", names.len(), name_list(&names))
    };
    Ok(json!({ "message": message, "employees": employees }))
}

fn update_employee(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: UpdateEmployeeArgs = decode(args)?;
    match resolve_or_reply(store, EntityKind::Employee, &parsed.name)? {
        Resolved::Reply(payload) => Ok(payload),
        Resolved::Hit(hit) => {
            let employee = store.update_employee(
                hit.id,
                parsed.role.as_deref(),
                parsed.phone.as_deref(),
                parsed.salary,
            )?;
            Ok(json!({
                "message": format!("Employee {} was updated.", employee.name),
                "employee": employee,
            }))
        }
    }
}

fn delete_employee(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: DeleteEmployeeArgs = decode(args)?;
    match resolve_or_reply(store, EntityKind::Employee, &parsed.name)? {
        Resolved::Reply(payload) => Ok(payload),
        Resolved::Hit(hit) => {
            store.delete_employee(hit.id)?;
            Ok(json!({ "message": format!("Employee {} was removed.", hit.name) }))
        }
    }
}

// ── Courses ──────────────────────────────────────────────────────────────

fn add_course(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: AddCourseArgs = decode(args)?;
    let course = store.add_course(
        parsed.name.trim(),
        parsed.teacher.as_deref(),
        parsed.price,
        parsed.duration.as_deref(),
    )?;
    Ok(json!({
        "message": format!("Course {} was created.", course.name),
        "course": course,
    }))
}

fn list_courses(store: &dyn DataStore, _args: Value) -> Result<Value, String> {
    let courses = store.list_courses()?;
    let names: Vec<String> = courses.iter().map(|c| c.name.clone()).collect();
    let message = if names.is_empty() {
        "There are no courses yet.".to_string()
    } else {
        format!("{} course(s): {}", names.len(), name_list(&names))
    };
    Ok(json!({ "message": message, "courses": courses }))
}

fn update_course(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: UpdateCourseArgs = decode(args)?;
    match resolve_or_reply(store, EntityKind::Course, &parsed.name)? {
        Resolved::Reply(payload) => Ok(payload),
        Resolved::Hit(hit) => {
            let course = store.update_course(
                hit.id,
                parsed.teacher.as_deref(),
                parsed.price,
                parsed.duration.as_deref(),
            )?;
            Ok(json!({
                "message": format!("Course {} was updated.", course.name),
                "course": course,
            }))
        }
    }
}

fn delete_course(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: DeleteCourseArgs = decode(args)?;
    match resolve_or_reply(store, EntityKind::Course, &parsed.name)? {
        Resolved::Reply(payload) => Ok(payload),
        Resolved::Hit(hit) => {
            store.delete_course(hit.id)?;
            Ok(json!({ "message": format!("Course {} was removed.", hit.name) }))
        }
    }
}

// ── Finance ──────────────────────────────────────────────────────────────

fn add_ledger_entry(
    store: &dyn DataStore,
    kind: LedgerKind,
    args: Value,
) -> Result<Value, String> {
    let parsed: AddLedgerArgs = decode(args)?;
    let date = parsed.date.unwrap_or_else(today_string);
    let entry = store.add_ledger(kind, parsed.label.trim(), parsed.amount, &date)?;
    Ok(json!({
        "message": format!(
            "Recorded {} of {:.2} for {} on {}.",
            entry.kind.as_str(),
            entry.amount,
            entry.label,
            entry.date
        ),
        "entry": entry,
    }))
}

fn add_income(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    add_ledger_entry(store, LedgerKind::Income, args)
}

fn add_expense(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    add_ledger_entry(store, LedgerKind::Expense, args)
}

/// Ledger entries are deleted by exact (case-insensitive) label. Several
/// entries sharing the label follow the same safety rule as name
/// resolution: list them, mutate nothing.
fn delete_ledger_entry(
    store: &dyn DataStore,
    kind: LedgerKind,
    args: Value,
) -> Result<Value, String> {
    let parsed: DeleteLedgerArgs = decode(args)?;
    let label = parsed.label.trim();
    let mut hits = store.find_ledger_by_label(kind, label)?;
    match hits.len() {
        0 => Ok(json!({
            "message": format!("No {} entry labelled \"{label}\" was found.", kind.as_str())
        })),
        1 => {
            let entry = hits.remove(0);
            store.delete_ledger(entry.id)?;
            Ok(json!({
                "message": format!(
                    "Removed the {} entry {} ({:.2}, {}).",
                    entry.kind.as_str(),
                    entry.label,
                    entry.amount,
                    entry.date
                )
            }))
        }
        _ => {
            let suggestions: Vec<Value> = hits
                .iter()
                .map(|e| json!({ "id": e.id, "name": format!("{} — {:.2} on {}", e.label, e.amount, e.date) }))
                .collect();
            Ok(json!({
                "message": format!(
                    "Several {} entries are labelled \"{label}\" — which one did you mean?",
                    kind.as_str()
                ),
                "suggestions": suggestions,
            }))
        }
    }
}

fn delete_income(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    delete_ledger_entry(store, LedgerKind::Income, args)
}

fn delete_expense(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    delete_ledger_entry(store, LedgerKind::Expense, args)
}

fn list_ledger(store: &dyn DataStore, args: Value) -> Result<Value, String> {
    let parsed: ListLedgerArgs = decode(args)?;
    let kind = parsed.kind.as_deref().map(|k| match k {
        "expense" => LedgerKind::Expense,
        _ => LedgerKind::Income,
    });
    let entries = store.list_ledger(kind)?;
    let message = if entries.is_empty() {
        "The ledger is empty.".to_string()
    } else {
        format!("{} ledger entr(ies).", entries.len())
    };
    Ok(json!({ "message": message, "entries": entries }))
}

fn financial_summary(store: &dyn DataStore, _args: Value) -> Result<Value, String> {
    let summary = store.financial_summary()?;
    Ok(json!({
        "message": format!(
            "Income {:.2}, tuition payments {:.2}, expenses {:.2} — net {:.2}.",
            summary.income_total, summary.payments_total, summary.expense_total, summary.net
        ),
        "summary": summary,
    }))
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::temp_store;
    use crate::tool_defs::tool_definitions_json;

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn test_registry_covers_exactly_the_catalog() {
        let registry = ToolRegistry::new();
        let catalog = tool_definitions_json();
        for tool in &catalog {
            let name = tool["name"].as_str().unwrap();
            assert!(registry.handler(name).is_some(), "no handler for {name}");
        }
        assert_eq!(registry.len(), catalog.len());
    }

    #[test]
    fn test_dispatch_skips_empty_ids_and_preserves_order() {
        let (store, path) = temp_store("dispatch_order");
        let registry = ToolRegistry::new();
        let calls = vec![
            call("a", "listStudents", json!({})),
            call("", "listStudents", json!({})),
            call("b", "listTasks", json!({})),
        ];
        let responses = dispatch(&registry, &store, &calls);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id, "a");
        assert_eq!(responses[1].id, "b");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_add_student_creates_and_names_the_student() {
        let (store, path) = temp_store("dispatch_add");
        let registry = ToolRegistry::new();
        let responses = dispatch(
            &registry,
            &store,
            &[call("c1", "addStudent", json!({ "name": "Olena Ivanova" }))],
        );
        assert_eq!(responses.len(), 1);
        let message = responses[0].result["message"].as_str().unwrap();
        assert!(message.contains("Olena Ivanova"), "{message}");
        assert_eq!(store.list_students().unwrap().len(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_delete_student_ambiguous_deletes_nothing() {
        let (store, path) = temp_store("dispatch_ambig");
        store.add_student("Olena Ivanova", None, None, None).unwrap();
        store.add_student("Olena Shevchenko", None, None, None).unwrap();
        let registry = ToolRegistry::new();

        let responses = dispatch(
            &registry,
            &store,
            &[call("c1", "deleteStudent", json!({ "name": "Olena" }))],
        );
        let result = &responses[0].result;
        assert!(result["message"].as_str().is_some());
        let suggestions = result["suggestions"].as_array().unwrap();
        assert_eq!(suggestions.len(), 2);
        assert!(suggestions[0]["name"].is_string());
        assert!(suggestions[0]["id"].is_i64());
        // the core safety invariant: nothing was removed
        assert_eq!(store.list_students().unwrap().len(), 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_unknown_tool_does_not_poison_the_batch() {
        let (store, path) = temp_store("dispatch_unknown");
        let registry = ToolRegistry::new();
        let responses = dispatch(
            &registry,
            &store,
            &[
                call("c1", "frobnicate", json!({})),
                call("c2", "addStudent", json!({ "name": "Petro Bondar" })),
            ],
        );
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].result["error"], "Unknown function");
        assert!(responses[0].error.is_none());
        assert!(responses[1].result["message"]
            .as_str()
            .unwrap()
            .contains("Petro Bondar"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_bad_args_become_per_call_error() {
        let (store, path) = temp_store("dispatch_bad_args");
        let registry = ToolRegistry::new();
        let responses = dispatch(
            &registry,
            &store,
            &[call("c1", "addStudent", json!({ "phone": "123" }))],
        );
        let err = responses[0].error.as_deref().unwrap();
        assert!(err.starts_with("Function execution failed:"), "{err}");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_payment_defaults_method_and_date() {
        let (store, path) = temp_store("dispatch_payment");
        store.add_student("Olena Ivanova", None, None, None).unwrap();
        let registry = ToolRegistry::new();
        dispatch(
            &registry,
            &store,
            &[call(
                "c1",
                "recordPayment",
                json!({ "studentName": "olena", "amount": 300.0 }),
            )],
        );
        let payments = store.list_payments().unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].method, "Cash");
        assert_eq!(payments[0].date, crate::util::today_string());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_task_defaults_priority_and_due_date() {
        let (store, path) = temp_store("dispatch_task");
        let registry = ToolRegistry::new();
        dispatch(
            &registry,
            &store,
            &[call("c1", "addTask", json!({ "title": "Order chairs" }))],
        );
        let tasks = store.list_tasks().unwrap();
        assert_eq!(tasks[0].priority, Priority::Medium);
        assert_eq!(tasks[0].due_date, crate::util::today_string());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_remember_fact_dedups_by_checksum() {
        let (store, path) = temp_store("dispatch_memory");
        let registry = ToolRegistry::new();
        let fact = json!({ "fact": "The summer term starts June 1st" });
        dispatch(&registry, &store, &[call("c1", "rememberFact", fact.clone())]);
        let responses = dispatch(&registry, &store, &[call("c2", "rememberFact", fact)]);
        assert!(responses[0].result["message"]
            .as_str()
            .unwrap()
            .starts_with("Already noted"));
        assert_eq!(store.list_memory_facts().unwrap().len(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_enroll_requires_both_resolutions() {
        let (store, path) = temp_store("dispatch_enroll");
        store.add_student("Olena Ivanova", None, None, None).unwrap();
        store.add_course("Rust Basics", None, None, None).unwrap();
        store.add_course("Rust Advanced", None, None, None).unwrap();
        let registry = ToolRegistry::new();

        // ambiguous course: no enrollment happens
        let responses = dispatch(
            &registry,
            &store,
            &[call(
                "c1",
                "enrollStudent",
                json!({ "studentName": "olena", "courseName": "rust" }),
            )],
        );
        assert!(responses[0].result["suggestions"].is_array());
        let students = store.list_students().unwrap();
        assert!(students[0].course.is_none());

        // unambiguous course: enrolled
        dispatch(
            &registry,
            &store,
            &[call(
                "c2",
                "enrollStudent",
                json!({ "studentName": "olena", "courseName": "basics" }),
            )],
        );
        let students = store.list_students().unwrap();
        assert_eq!(students[0].course.as_deref(), Some("Rust Basics"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_delete_expense_with_duplicate_labels_mutates_nothing() {
        let (store, path) = temp_store("dispatch_ledger");
        store
            .add_ledger(LedgerKind::Expense, "Office rent", 500.0, "2026-07-01")
            .unwrap();
        store
            .add_ledger(LedgerKind::Expense, "Office rent", 500.0, "2026-08-01")
            .unwrap();
        let registry = ToolRegistry::new();
        let responses = dispatch(
            &registry,
            &store,
            &[call("c1", "deleteExpense", json!({ "label": "office rent" }))],
        );
        assert_eq!(responses[0].result["suggestions"].as_array().unwrap().len(), 2);
        assert_eq!(store.list_ledger(Some(LedgerKind::Expense)).unwrap().len(), 2);
        std::fs::remove_file(&path).ok();
    }
}
