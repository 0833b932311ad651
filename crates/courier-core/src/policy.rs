//! Generated access and redrive policy documents.

/// Access policy granting unrestricted `SendMessage` on a queue, so bound
/// topics can deliver into it. `arn` is the queue's address.
pub fn access_policy_json(arn: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Id": format!("{arn}/SQSDefaultPolicy"),
        "Statement": [{
            "Sid": "1",
            "Effect": "Allow",
            "Principal": "*",
            "Action": "SendMessage",
            "Resource": arn,
        }]
    })
    .to_string()
}

/// Redrive policy moving messages to the dead-letter queue at
/// `dead_letter_arn` once they have been received more than
/// `max_receive_count` times. The count is encoded as a string, which is how
/// SQS-shaped backends expect it.
pub fn redrive_policy_json(max_receive_count: u32, dead_letter_arn: &str) -> String {
    serde_json::json!({
        "maxReceiveCount": max_receive_count.to_string(),
        "deadLetterTargetArn": dead_letter_arn,
    })
    .to_string()
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
