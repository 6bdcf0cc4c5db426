//! Serving the broker over a pair of byte streams.

use crate::protocol::handle_line;
use crate::Broker;
use std::io::{self, BufRead, Write};
use tracing::info;

/// Answer every request line from `input` on `output` until end of input.
///
/// Blank lines are skipped. Returns the number of requests answered.
pub fn serve<R: BufRead, W: Write>(broker: &Broker, input: R, mut output: W) -> io::Result<usize> {
    let mut answered = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(broker, &line);
        serde_json::to_writer(&mut output, &response)?;
        output.write_all(b"\n")?;
        output.flush()?;
        answered += 1;
    }
    info!(answered, "input closed");
    Ok(answered)
}

/// Serve on the process's stdin and stdout.
pub fn serve_stdio(broker: &Broker) -> io::Result<usize> {
    info!("serving on stdio");
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(broker, stdin.lock(), stdout.lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Response;
    use crate::BrokerConfig;

    #[test]
    fn test_serve_answers_each_line() {
        let broker = Broker::with_d_engine(&BrokerConfig {
            worker_threads: 1,
            ..BrokerConfig::default()
        })
        .unwrap();
        let input = concat!(
            r#"{"id":1,"method":"updateModule","params":{"filename":"a.d","text":"void f(){"}}"#,
            "\n\n",
            r#"{"id":2,"method":"getParseErrors","params":{"filename":"a.d"}}"#,
            "\n",
            "garbage\n",
        );
        let mut output = Vec::new();
        let answered = serve(&broker, input.as_bytes(), &mut output).unwrap();
        assert_eq!(answered, 3);

        let responses: Vec<Response> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses[0].id, 1);
        let errors = responses[1].result.as_ref().unwrap().as_str().unwrap();
        assert_eq!(errors.lines().count(), 1);
        assert_eq!(responses[2].error.as_ref().unwrap().code, -32700);
    }
}
