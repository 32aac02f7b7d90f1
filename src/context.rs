//! System-instruction assembly. Rebuilt on every turn and at every live
//! session start: remembered facts may have been written by a tool call
//! earlier in the same conversation, so nothing here is cached.

use crate::store::DataStore;
use crate::tool_defs::tool_definitions_json;
use crate::types::ContextMode;
use crate::util::today_string;

const PERSONA: &str = "You are Mira, the operations assistant of a training academy. \
You help the staff manage students, courses, employees, tasks and finances. \
Be concise and concrete; confirm what you did after acting.";

const TOOL_GUIDANCE: &str = "Use the available functions to read or change CRM data. \
Names given by the user may be partial — the functions resolve them; when a function \
returns suggestions, present them to the user and ask which one was meant instead of guessing.";

const GUEST_GUIDANCE: &str = "You are talking to a guest. You have no functions and no \
access to CRM data in this mode. Do not offer to create, change or look up records; \
answer general questions about the academy only.";

pub(crate) fn build_system_context(
    store: &dyn DataStore,
    mode: ContextMode,
) -> Result<String, String> {
    let mut sections: Vec<String> = Vec::new();
    sections.push(PERSONA.to_string());
    sections.push(format!("Today is {}.", today_string()));

    match mode {
        ContextMode::Guest => {
            sections.push(GUEST_GUIDANCE.to_string());
        }
        ContextMode::Authenticated => {
            sections.push(TOOL_GUIDANCE.to_string());

            let knowledge = store.list_knowledge()?;
            if !knowledge.is_empty() {
                let mut block = String::from("Academy knowledge base:");
                for snippet in &knowledge {
                    block.push_str(&format!("\n- {}: {}", snippet.title, snippet.body));
                }
                sections.push(block);
            }

            let facts = store.list_memory_facts()?;
            if !facts.is_empty() {
                let mut block = String::from("Remembered facts:");
                for fact in &facts {
                    block.push_str(&format!("\n- {}", fact.text));
                }
                sections.push(block);
            }
        }
    }

    Ok(sections.join("\n\n"))
}

/// The tool list advertised to the gateway. Guests get none — this, together
/// with the dispatcher never being invoked on a guest turn, is the hard gate
/// that keeps guests read-only.
pub(crate) fn tools_for_mode(mode: ContextMode) -> Vec<serde_json::Value> {
    match mode {
        ContextMode::Authenticated => tool_definitions_json(),
        ContextMode::Guest => Vec::new(),
    }
}
