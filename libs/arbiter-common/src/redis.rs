use crate::types::SubmissionRecord;
use redis::{AsyncCommands, RedisResult};

/// Redis key layout for submission records written by the API.
/// The grading engine itself never touches Redis.

pub const SUBMISSION_PREFIX: &str = "arbiter:submission";
pub const PROBLEM_INDEX_PREFIX: &str = "arbiter:problem";

/// Key holding one serialized submission record
pub fn submission_key(submission_id: &uuid::Uuid) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, submission_id)
}

/// Key of the list of submission ids recorded for a problem
pub fn problem_index_key(problem_id: &str) -> String {
    format!("{}:{}:submissions", PROBLEM_INDEX_PREFIX, problem_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

/// Persist a submission record and index it under its problem
pub async fn store_record(
    conn: &mut redis::aio::ConnectionManager,
    record: &SubmissionRecord,
) -> RedisResult<()> {
    let key = submission_key(&record.id);
    let payload = serde_json::to_string(record).map_err(serialization_error)?;

    // Records and their index expire after 24 hours
    let _: () = conn.set_ex(&key, payload, 86400).await?;

    let index = problem_index_key(&record.problem_id);
    let _: () = conn.lpush(&index, record.id.to_string()).await?;
    let _: () = conn.expire(&index, 86400).await?;

    Ok(())
}

/// Fetch a submission record, `None` when absent or expired
pub async fn get_record(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &uuid::Uuid,
) -> RedisResult<Option<SubmissionRecord>> {
    let key = submission_key(submission_id);
    let payload: Option<String> = conn.get(&key).await?;

    match payload {
        Some(data) => {
            let record: SubmissionRecord = serde_json::from_str(&data).map_err(|e| {
                redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "deserialization error",
                    e.to_string(),
                ))
            })?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}
