//! Identifier type definitions.

use crate::define_id;

define_id!(SlaveId);
define_id!(FrameworkId);
define_id!(ExecutorId);
define_id!(TaskId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let id = FrameworkId::parse("fw-201104").unwrap();
        assert_eq!(id.as_str(), "fw-201104");
        assert_eq!(id.to_string(), "fw-201104");

        let reparsed: FrameworkId = id.to_string().parse().unwrap();
        assert_eq!(reparsed, id);
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(SlaveId::parse(""), Err(crate::IdError::Empty));
    }

    #[test]
    fn test_parse_rejects_whitespace() {
        assert_eq!(
            TaskId::parse("task 1"),
            Err(crate::IdError::ForbiddenCharacter(' '))
        );
        assert_eq!(
            ExecutorId::parse("exec\n1"),
            Err(crate::IdError::ForbiddenCharacter('\n'))
        );
    }

    #[test]
    fn test_types_are_distinct() {
        // Same raw value, different types: equality only compiles within a type.
        let task = TaskId::parse("x").unwrap();
        let other = TaskId::parse("x").unwrap();
        assert_eq!(task, other);
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = SlaveId::parse("s1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"s1\"");

        let back: SlaveId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let result: Result<TaskId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_ordering() {
        let a = TaskId::parse("t1").unwrap();
        let b = TaskId::parse("t2").unwrap();
        assert!(a < b);
    }
}
