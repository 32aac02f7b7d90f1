use std::collections::HashMap;

use serde_json;

/// The fixed catalog of operations the model may call. Defined once at
/// startup and advertised verbatim to the gateway in both transports.
/// Purely descriptive — dispatch lives in `dispatch.rs`.
pub(crate) fn tool_definitions_json() -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({
            "name": "rememberFact",
            "description": "Store a fact about the academy or its people for future conversations.",
            "parameters": {
                "type": "object",
                "properties": {
                    "fact": { "type": "string", "description": "The fact to remember, one sentence." }
                },
                "required": ["fact"]
            }
        }),
        serde_json::json!({
            "name": "addStudent",
            "description": "Register a new student.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Full name of the student." },
                    "phone": { "type": "string" },
                    "email": { "type": "string" },
                    "courseName": { "type": "string", "description": "Course to enroll into right away." }
                },
                "required": ["name"]
            }
        }),
        serde_json::json!({
            "name": "listStudents",
            "description": "List all registered students.",
            "parameters": { "type": "object", "properties": {} }
        }),
        serde_json::json!({
            "name": "updateStudent",
            "description": "Update a student's contact details or course. Accepts a partial name, case-insensitive.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Student name; partial matches are resolved." },
                    "phone": { "type": "string" },
                    "email": { "type": "string" },
                    "courseName": { "type": "string" }
                },
                "required": ["name"]
            }
        }),
        serde_json::json!({
            "name": "deleteStudent",
            "description": "Remove a student. Accepts a partial name, case-insensitive; asks back when several students match.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Student name; partial matches are resolved." }
                },
                "required": ["name"]
            }
        }),
        serde_json::json!({
            "name": "enrollStudent",
            "description": "Enroll an existing student into a course. Both names accept partial, case-insensitive matches.",
            "parameters": {
                "type": "object",
                "properties": {
                    "studentName": { "type": "string" },
                    "courseName": { "type": "string" }
                },
                "required": ["studentName", "courseName"]
            }
        }),
        serde_json::json!({
            "name": "recordPayment",
            "description": "Record a tuition payment from a student. The student name accepts partial, case-insensitive matches.",
            "parameters": {
                "type": "object",
                "properties": {
                    "studentName": { "type": "string" },
                    "amount": { "type": "number" },
                    "method": {
                        "type": "string",
                        "enum": ["Cash", "Card", "Transfer"],
                        "description": "Defaults to Cash when omitted."
                    }
                },
                "required": ["studentName", "amount"]
            }
        }),
        serde_json::json!({
            "name": "addStudentNote",
            "description": "Append a note to a student's record. Accepts a partial name, case-insensitive.",
            "parameters": {
                "type": "object",
                "properties": {
                    "studentName": { "type": "string" },
                    "note": { "type": "string" }
                },
                "required": ["studentName", "note"]
            }
        }),
        serde_json::json!({
            "name": "addTask",
            "description": "Create a task for the team.",
            "parameters": {
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "notes": { "type": "string" },
                    "assignee": { "type": "string" },
                    "priority": {
                        "type": "string",
                        "enum": ["Low", "Medium", "High"],
                        "description": "Defaults to Medium when omitted."
                    },
                    "dueDate": { "type": "string", "description": "YYYY-MM-DD; defaults to today." }
                },
                "required": ["title"]
            }
        }),
        serde_json::json!({
            "name": "listTasks",
            "description": "List all tasks with status, priority and due date.",
            "parameters": { "type": "object", "properties": {} }
        }),
        serde_json::json!({
            "name": "completeTask",
            "description": "Mark a task as done. The title accepts partial, case-insensitive matches.",
            "parameters": {
                "type": "object",
                "properties": {
                    "title": { "type": "string" }
                },
                "required": ["title"]
            }
        }),
        serde_json::json!({
            "name": "deleteTask",
            "description": "Delete a task. The title accepts partial, case-insensitive matches.",
            "parameters": {
                "type": "object",
                "properties": {
                    "title": { "type": "string" }
                },
                "required": ["title"]
            }
        }),
        serde_json::json!({
            "name": "addEmployee",
            "description": "Register a new employee.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "role": { "type": "string" },
                    "phone": { "type": "string" },
                    "salary": { "type": "number" }
                },
                "required": ["name"]
            }
        }),
        serde_json::json!({
            "name": "listEmployees",
            "description": "List all employees.",
            "parameters": { "type": "object", "properties": {} }
        }),
        serde_json::json!({
            "name": "updateEmployee",
            "description": "Update an employee's role, phone or salary. Accepts a partial name, case-insensitive.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "role": { "type": "string" },
                    "phone": { "type": "string" },
                    "salary": { "type": "number" }
                },
                "required": ["name"]
            }
        }),
        serde_json::json!({
            "name": "deleteEmployee",
            "description": "Remove an employee. Accepts a partial name, case-insensitive.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" }
                },
                "required": ["name"]
            }
        }),
        serde_json::json!({
            "name": "addCourse",
            "description": "Create a course.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "teacher": { "type": "string" },
                    "price": { "type": "number" },
                    "duration": { "type": "string", "description": "Free-form, e.g. '8 weeks'." }
                },
                "required": ["name"]
            }
        }),
        serde_json::json!({
            "name": "listCourses",
            "description": "List all courses.",
            "parameters": { "type": "object", "properties": {} }
        }),
        serde_json::json!({
            "name": "updateCourse",
            "description": "Update a course's teacher, price or duration. Accepts a partial name, case-insensitive.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "teacher": { "type": "string" },
                    "price": { "type": "number" },
                    "duration": { "type": "string" }
                },
                "required": ["name"]
            }
        }),
        serde_json::json!({
            "name": "deleteCourse",
            "description": "Remove a course. Accepts a partial name, case-insensitive.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" }
                },
                "required": ["name"]
            }
        }),
        serde_json::json!({
            "name": "addIncome",
            "description": "Record a non-tuition income entry.",
            "parameters": {
                "type": "object",
                "properties": {
                    "label": { "type": "string", "description": "What the income is for." },
                    "amount": { "type": "number" },
                    "date": { "type": "string", "description": "YYYY-MM-DD; defaults to today." }
                },
                "required": ["label", "amount"]
            }
        }),
        serde_json::json!({
            "name": "addExpense",
            "description": "Record an expense entry.",
            "parameters": {
                "type": "object",
                "properties": {
                    "label": { "type": "string", "description": "What the expense is for." },
                    "amount": { "type": "number" },
                    "date": { "type": "string", "description": "YYYY-MM-DD; defaults to today." }
                },
                "required": ["label", "amount"]
            }
        }),
        serde_json::json!({
            "name": "deleteIncome",
            "description": "Delete an income entry by its exact label (case-insensitive).",
            "parameters": {
                "type": "object",
                "properties": {
                    "label": { "type": "string" }
                },
                "required": ["label"]
            }
        }),
        serde_json::json!({
            "name": "deleteExpense",
            "description": "Delete an expense entry by its exact label (case-insensitive).",
            "parameters": {
                "type": "object",
                "properties": {
                    "label": { "type": "string" }
                },
                "required": ["label"]
            }
        }),
        serde_json::json!({
            "name": "listLedger",
            "description": "List income and expense entries.",
            "parameters": {
                "type": "object",
                "properties": {
                    "kind": { "type": "string", "enum": ["income", "expense"] }
                }
            }
        }),
        serde_json::json!({
            "name": "financialSummary",
            "description": "Totals for income, tuition payments and expenses, plus the net balance.",
            "parameters": { "type": "object", "properties": {} }
        }),
    ]
}

pub(crate) fn tool_catalog_map(catalog: &[serde_json::Value]) -> HashMap<String, serde_json::Value> {
    let mut map = HashMap::new();
    for tool in catalog {
        if let Some(name) = tool.get("name").and_then(|v| v.as_str()) {
            map.insert(name.to_string(), tool.clone());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_are_unique() {
        let catalog = tool_definitions_json();
        let map = tool_catalog_map(&catalog);
        assert_eq!(map.len(), catalog.len());
    }

    #[test]
    fn test_every_tool_has_object_parameters() {
        for tool in tool_definitions_json() {
            let name = tool["name"].as_str().unwrap();
            assert_eq!(
                tool["parameters"]["type"].as_str(),
                Some("object"),
                "tool {name} parameters must be an object schema"
            );
        }
    }

    #[test]
    fn test_by_name_tools_document_partial_matching() {
        let catalog = tool_definitions_json();
        let map = tool_catalog_map(&catalog);
        for name in ["deleteStudent", "updateEmployee", "deleteCourse", "completeTask"] {
            let desc = map[name]["description"].as_str().unwrap();
            assert!(desc.to_ascii_lowercase().contains("partial"), "{name}: {desc}");
        }
    }
}
