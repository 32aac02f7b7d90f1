//! Typed argument sets, one per tool, decoded at the dispatch boundary.
//! The gateway is trusted to have validated against the advertised schema;
//! optionals still default defensively (`#[serde(default)]`) because the
//! model occasionally omits fields the schema marks optional.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct RememberFactArgs {
    pub(crate) fact: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddStudentArgs {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) phone: Option<String>,
    #[serde(default)]
    pub(crate) email: Option<String>,
    #[serde(default, rename = "courseName")]
    pub(crate) course_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateStudentArgs {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) phone: Option<String>,
    #[serde(default)]
    pub(crate) email: Option<String>,
    #[serde(default, rename = "courseName")]
    pub(crate) course_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteStudentArgs {
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnrollStudentArgs {
    #[serde(rename = "studentName")]
    pub(crate) student_name: String,
    #[serde(rename = "courseName")]
    pub(crate) course_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordPaymentArgs {
    #[serde(rename = "studentName")]
    pub(crate) student_name: String,
    pub(crate) amount: f64,
    #[serde(default)]
    pub(crate) method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddStudentNoteArgs {
    #[serde(rename = "studentName")]
    pub(crate) student_name: String,
    pub(crate) note: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddTaskArgs {
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) notes: Option<String>,
    #[serde(default)]
    pub(crate) assignee: Option<String>,
    #[serde(default)]
    pub(crate) priority: Option<String>,
    #[serde(default, rename = "dueDate")]
    pub(crate) due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskByTitleArgs {
    pub(crate) title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddEmployeeArgs {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) role: Option<String>,
    #[serde(default)]
    pub(crate) phone: Option<String>,
    #[serde(default)]
    pub(crate) salary: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateEmployeeArgs {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) role: Option<String>,
    #[serde(default)]
    pub(crate) phone: Option<String>,
    #[serde(default)]
    pub(crate) salary: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteEmployeeArgs {
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddCourseArgs {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) teacher: Option<String>,
    #[serde(default)]
    pub(crate) price: Option<f64>,
    #[serde(default)]
    pub(crate) duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateCourseArgs {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) teacher: Option<String>,
    #[serde(default)]
    pub(crate) price: Option<f64>,
    #[serde(default)]
    pub(crate) duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteCourseArgs {
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddLedgerArgs {
    pub(crate) label: String,
    pub(crate) amount: f64,
    #[serde(default)]
    pub(crate) date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteLedgerArgs {
    pub(crate) label: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListLedgerArgs {
    #[serde(default)]
    pub(crate) kind: Option<String>,
}
