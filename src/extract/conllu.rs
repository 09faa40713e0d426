//! CoNLL-U reader for dependency parser output.
//!
//! Only the columns the extraction rules need are kept: ID, FORM, LEMMA,
//! UPOS, HEAD and DEPREL.

use crate::error::{Result, TriplegraphError};

/// One syntactic word of a parsed sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// 1-based position in the sentence
    pub id: usize,
    pub form: String,
    pub lemma: String,
    pub upos: String,
    /// Id of the governing token, 0 for the root
    pub head: usize,
    pub deprel: String,
}

impl Token {
    /// Lemma, falling back to the surface form when the parser gave none
    pub fn lemma_or_form(&self) -> &str {
        if self.lemma.is_empty() || self.lemma == "_" {
            &self.form
        } else {
            &self.lemma
        }
    }
}

/// A parsed sentence; tokens are stored in id order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    pub tokens: Vec<Token>,
}

impl Sentence {
    /// Direct dependents of `id`, in sentence order
    pub fn children(&self, id: usize) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(move |t| t.head == id && t.id != id)
    }
}

fn parse_index(value: &str, column: &str, line_no: usize) -> Result<usize> {
    value.parse().map_err(|_| {
        TriplegraphError::Parse(format!(
            "line {}: invalid {} value '{}'",
            line_no, column, value
        ))
    })
}

/// Parse CoNLL-U text into sentences
pub fn parse_conllu(input: &str) -> Result<Vec<Sentence>> {
    let mut sentences = Vec::new();
    let mut current = Sentence::default();

    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_end_matches('\r');

        if line.trim().is_empty() {
            if !current.tokens.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 8 {
            return Err(TriplegraphError::Parse(format!(
                "line {}: expected at least 8 tab-separated columns, found {}",
                line_no,
                cols.len()
            )));
        }

        // multiword token ranges and empty nodes carry no dependency edge
        if cols[0].contains('-') || cols[0].contains('.') {
            continue;
        }

        current.tokens.push(Token {
            id: parse_index(cols[0], "ID", line_no)?,
            form: cols[1].to_string(),
            lemma: cols[2].to_string(),
            upos: cols[3].to_string(),
            head: parse_index(cols[6], "HEAD", line_no)?,
            deprel: cols[7].to_string(),
        });
    }

    if !current.tokens.is_empty() {
        sentences.push(current);
    }

    Ok(sentences)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EINSTEIN: &str = "# sent_id = 1
# text = Einstein won the Nobel Prize.
1\tEinstein\tEinstein\tPROPN\tNNP\t_\t2\tnsubj\t_\t_
2\twon\twin\tVERB\tVBD\t_\t0\troot\t_\t_
3\tthe\tthe\tDET\tDT\t_\t5\tdet\t_\t_
4\tNobel\tNobel\tPROPN\tNNP\t_\t5\tcompound\t_\t_
5\tPrize\tPrize\tPROPN\tNNP\t_\t2\tobj\t_\tSpaceAfter=No
6\t.\t.\tPUNCT\t.\t_\t2\tpunct\t_\t_

# sent_id = 2
1\tHe\the\tPRON\tPRP\t_\t2\tnsubj\t_\t_
2\tslept\tsleep\tVERB\tVBD\t_\t0\troot\t_\t_
";

    #[test]
    fn test_parse_two_sentences() {
        let sentences = parse_conllu(EINSTEIN).unwrap();
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].tokens.len(), 6);
        assert_eq!(sentences[1].tokens.len(), 2);

        let won = &sentences[0].tokens[1];
        assert_eq!(won.id, 2);
        assert_eq!(won.lemma, "win");
        assert_eq!(won.upos, "VERB");
        assert_eq!(won.head, 0);
        assert_eq!(won.deprel, "root");
    }

    #[test]
    fn test_children_in_sentence_order() {
        let sentences = parse_conllu(EINSTEIN).unwrap();
        let children: Vec<_> = sentences[0].children(2).map(|t| t.form.as_str()).collect();
        assert_eq!(children, vec!["Einstein", "Prize", "."]);
    }

    #[test]
    fn test_skips_multiword_and_empty_nodes() {
        let input = "1-2\tvámonos\t_\t_\t_\t_\t_\t_\t_\t_
1\tvamos\tir\tVERB\t_\t_\t0\troot\t_\t_
2\tnos\tnosotros\tPRON\t_\t_\t1\tobj\t_\t_
2.1\telided\t_\t_\t_\t_\t_\t_\t_\t_
";
        let sentences = parse_conllu(input).unwrap();
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].tokens.len(), 2);
    }

    #[test]
    fn test_short_line_is_error() {
        let err = parse_conllu("1\tword\tword\n").unwrap_err();
        assert!(matches!(err, TriplegraphError::Parse(_)));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_bad_head_is_error() {
        let err = parse_conllu("1\tword\tword\tNOUN\t_\t_\tX\troot\t_\t_\n").unwrap_err();
        assert!(err.to_string().contains("HEAD"));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_conllu("").unwrap().is_empty());
        assert!(parse_conllu("\n\n# only a comment\n").unwrap().is_empty());
    }

    #[test]
    fn test_lemma_fallback() {
        let t = Token {
            id: 1,
            form: "ran".to_string(),
            lemma: "_".to_string(),
            upos: "VERB".to_string(),
            head: 0,
            deprel: "root".to_string(),
        };
        assert_eq!(t.lemma_or_form(), "ran");
    }
}
