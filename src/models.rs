use serde::{Deserialize, Serialize};

/// A todo as stored under its record key and returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Todo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub completed: bool,
}

/// Request body for POST /todos
///
/// Unknown fields are rejected so that client drift shows up as a 400.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateTodo {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Response type for DELETE /todos/{id}
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_todo_defaults_description() {
        let input: CreateTodo = serde_json::from_str(r#"{"title":"buy milk"}"#).unwrap();
        assert_eq!(input.title, "buy milk");
        assert_eq!(input.description, "");
    }

    #[test]
    fn test_create_todo_rejects_unknown_fields() {
        let result = serde_json::from_str::<CreateTodo>(r#"{"title":"x","extra":1}"#);
        assert!(result.unwrap_err().to_string().contains("unknown field"));
    }

    #[test]
    fn test_create_todo_requires_title() {
        assert!(serde_json::from_str::<CreateTodo>(r#"{"description":"d"}"#).is_err());
    }

    #[test]
    fn test_todo_wire_shape() {
        let todo = Todo {
            id: "abc".to_string(),
            title: "t".to_string(),
            description: String::new(),
            completed: false,
        };

        assert_eq!(
            serde_json::to_value(&todo).unwrap(),
            serde_json::json!({"id": "abc", "title": "t", "description": "", "completed": false})
        );
    }
}
