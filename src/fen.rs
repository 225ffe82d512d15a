//! Structural validation of FEN position strings.
//!
//! Every engine-facing tool gates its input through [`validate`] before the
//! position ever reaches the rules library or the engine subprocess. The
//! checks here are purely structural (field counts, rank shapes, token
//! alphabets); chess legality beyond "exactly one king per side" is the
//! rules library's job.

use derive_more::{Display, Error};
use tracing::{debug, instrument};

/// Recognized piece letters in the board field.
const PIECE_LETTERS: &str = "pnbrqk";

/// A violated FEN rule, one variant per check.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum FenError {
    /// The input string is empty.
    #[display("FEN is empty")]
    Empty,
    /// Wrong number of space-separated fields.
    #[display("the number of fields is {_0}, 6 fields required")]
    FieldCount(#[error(not(source))] usize),
    /// Wrong number of `/`-separated ranks in the board field.
    #[display("the number of ranks is {_0}, must be 8 ranks")]
    RankCount(#[error(not(source))] usize),
    /// A rank does not describe exactly 8 squares.
    #[display("rank {rank} covers {count} squares, must be 8 squares")]
    SquareCount {
        /// Rank index, 1-based from the top of the board field.
        rank: usize,
        /// Number of squares the rank actually describes.
        count: u32,
    },
    /// A board character is neither a digit nor a recognized piece letter.
    #[display("invalid piece character '{_0}'")]
    PieceChar(#[error(not(source))] char),
    /// The side-to-move field is not `w` or `b`.
    #[display("side to move is '{_0}', must be 'w' or 'b'")]
    SideToMove(#[error(not(source))] String),
    /// A castling-rights character appears more than once.
    #[display("duplicate castling rights character '{_0}'")]
    CastlingDuplicate(#[error(not(source))] char),
    /// A castling-rights character outside `KQkq`.
    #[display("invalid castling rights character '{_0}'")]
    CastlingChar(#[error(not(source))] char),
    /// The en passant field is not `-` or a square on rank 3 or 6.
    #[display("en passant square '{_0}' is invalid, rank must be 3 or 6")]
    EnPassant(#[error(not(source))] String),
    /// The halfmove clock is not a non-negative integer.
    #[display("halfmove clock '{_0}' must be a non-negative integer")]
    HalfmoveClock(#[error(not(source))] String),
    /// The fullmove number is not a positive integer.
    #[display("fullmove number '{_0}' must be a positive integer")]
    FullmoveNumber(#[error(not(source))] String),
    /// A side does not have exactly one king.
    #[display("board must have exactly one {color} king, found {count}")]
    KingCount {
        /// `"white"` or `"black"`.
        color: &'static str,
        /// Number of kings of that color on the board.
        count: usize,
    },
}

/// Validates a FEN string, failing fast on the first violated rule.
#[instrument(level = "debug", skip(fen))]
pub fn validate(fen: &str) -> Result<(), FenError> {
    check_empty(fen)?;
    let fields = split_fields(fen);
    check_field_count(&fields)?;
    check_rank_count(fields[0])?;
    check_square_counts(fields[0])?;
    check_piece_chars(fields[0])?;
    check_side_to_move(fields[1])?;
    check_castling(fields[2])?;
    check_en_passant(fields[3])?;
    check_halfmove_clock(fields[4])?;
    check_fullmove_number(fields[5])?;
    check_king_counts(fields[0])?;
    Ok(())
}

/// Returns whether the FEN string passes [`validate`]; never errors.
#[instrument(level = "debug", skip(fen))]
pub fn is_valid(fen: &str) -> bool {
    match validate(fen) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "FEN validation failed");
            false
        }
    }
}

/// Runs every applicable check and collects all failures, unlike the
/// fail-fast [`validate`]. A valid FEN yields an empty list.
///
/// Checks on fields that are absent (wrong field count) are skipped —
/// there is nothing to check.
pub fn validation_errors(fen: &str) -> Vec<FenError> {
    let mut errors = Vec::new();

    if let Err(e) = check_empty(fen) {
        errors.push(e);
        return errors;
    }

    let fields = split_fields(fen);
    if let Err(e) = check_field_count(&fields) {
        errors.push(e);
    }

    let board = fields[0];
    if let Err(e) = check_rank_count(board) {
        errors.push(e);
    }
    if let Err(e) = check_square_counts(board) {
        errors.push(e);
    }
    if let Err(e) = check_piece_chars(board) {
        errors.push(e);
    }
    errors.extend(king_count_errors(board));

    let checks: [(usize, fn(&str) -> Result<(), FenError>); 5] = [
        (1, check_side_to_move),
        (2, check_castling),
        (3, check_en_passant),
        (4, check_halfmove_clock),
        (5, check_fullmove_number),
    ];
    for (idx, check) in checks {
        if let Some(field) = fields.get(idx)
            && let Err(e) = check(field)
        {
            errors.push(e);
        }
    }

    errors
}

fn split_fields(fen: &str) -> Vec<&str> {
    fen.split(' ').collect()
}

fn check_empty(fen: &str) -> Result<(), FenError> {
    if fen.is_empty() {
        return Err(FenError::Empty);
    }
    Ok(())
}

fn check_field_count(fields: &[&str]) -> Result<(), FenError> {
    if fields.len() != 6 {
        return Err(FenError::FieldCount(fields.len()));
    }
    Ok(())
}

fn check_rank_count(board: &str) -> Result<(), FenError> {
    let ranks = board.split('/').count();
    if ranks != 8 {
        return Err(FenError::RankCount(ranks));
    }
    Ok(())
}

fn check_square_counts(board: &str) -> Result<(), FenError> {
    for (i, rank) in board.split('/').enumerate() {
        let count: u32 = rank
            .chars()
            .map(|c| c.to_digit(10).unwrap_or(1))
            .sum();
        if count != 8 {
            return Err(FenError::SquareCount {
                rank: i + 1,
                count,
            });
        }
    }
    Ok(())
}

fn check_piece_chars(board: &str) -> Result<(), FenError> {
    for c in board.chars() {
        if c == '/' || c.is_ascii_digit() {
            continue;
        }
        if !PIECE_LETTERS.contains(c.to_ascii_lowercase()) {
            return Err(FenError::PieceChar(c));
        }
    }
    Ok(())
}

fn check_side_to_move(side: &str) -> Result<(), FenError> {
    if side != "w" && side != "b" {
        return Err(FenError::SideToMove(side.to_string()));
    }
    Ok(())
}

fn check_castling(rights: &str) -> Result<(), FenError> {
    if rights == "-" {
        return Ok(());
    }
    let mut seen = Vec::new();
    for c in rights.chars() {
        if !"KQkq".contains(c) {
            return Err(FenError::CastlingChar(c));
        }
        if seen.contains(&c) {
            return Err(FenError::CastlingDuplicate(c));
        }
        seen.push(c);
    }
    Ok(())
}

fn check_en_passant(square: &str) -> Result<(), FenError> {
    if square == "-" {
        return Ok(());
    }
    let chars: Vec<char> = square.chars().collect();
    let well_formed = chars.len() == 2
        && ('a'..='h').contains(&chars[0])
        && (chars[1] == '3' || chars[1] == '6');
    if !well_formed {
        return Err(FenError::EnPassant(square.to_string()));
    }
    Ok(())
}

fn check_halfmove_clock(field: &str) -> Result<(), FenError> {
    match field.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(()),
        _ => Err(FenError::HalfmoveClock(field.to_string())),
    }
}

fn check_fullmove_number(field: &str) -> Result<(), FenError> {
    match field.parse::<i64>() {
        Ok(n) if n >= 1 => Ok(()),
        _ => Err(FenError::FullmoveNumber(field.to_string())),
    }
}

fn check_king_counts(board: &str) -> Result<(), FenError> {
    match king_count_errors(board).into_iter().next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn king_count_errors(board: &str) -> Vec<FenError> {
    let white = board.chars().filter(|&c| c == 'K').count();
    let black = board.chars().filter(|&c| c == 'k').count();
    let mut errors = Vec::new();
    if white != 1 {
        errors.push(FenError::KingCount {
            color: "white",
            count: white,
        });
    }
    if black != 1 {
        errors.push(FenError::KingCount {
            color: "black",
            count: black,
        });
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_startpos_is_valid() {
        assert!(validate(STARTPOS).is_ok());
        assert!(is_valid(STARTPOS));
        assert!(validation_errors(STARTPOS).is_empty());
    }

    #[test]
    fn test_empty_fen() {
        assert_eq!(validate(""), Err(FenError::Empty));
        assert!(!is_valid(""));
    }

    #[test]
    fn test_seven_fields() {
        let fen = format!("{STARTPOS} extra");
        assert_eq!(validate(&fen), Err(FenError::FieldCount(7)));
        assert!(validate(&fen).unwrap_err().to_string().contains("6 fields required"));
    }

    #[test]
    fn test_five_fields() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0"),
            Err(FenError::FieldCount(5))
        );
    }

    #[test]
    fn test_seven_ranks() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
            Err(FenError::RankCount(7))
        );
    }

    #[test]
    fn test_rank_with_nine_squares() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/9/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
            Err(FenError::SquareCount { rank: 3, count: 9 })
        );
    }

    #[test]
    fn test_rank_with_seven_squares() {
        assert_eq!(
            validate("rnbqkbnr/ppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
            Err(FenError::SquareCount { rank: 2, count: 7 })
        );
    }

    #[test]
    fn test_invalid_piece_letter() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQXBNR w KQkq - 0 1"),
            Err(FenError::PieceChar('X'))
        );
    }

    #[test]
    fn test_bad_side_to_move() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1"),
            Err(FenError::SideToMove("x".into()))
        );
    }

    #[test]
    fn test_duplicate_castling_rights() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KKkq - 0 1"),
            Err(FenError::CastlingDuplicate('K'))
        );
    }

    #[test]
    fn test_invalid_castling_character() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQxq - 0 1"),
            Err(FenError::CastlingChar('x'))
        );
    }

    #[test]
    fn test_no_castling_rights_ok() {
        assert!(validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w - - 0 1").is_ok());
    }

    #[test]
    fn test_en_passant_rank_four_rejected() {
        let err =
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq e4 0 1").unwrap_err();
        assert_eq!(err, FenError::EnPassant("e4".into()));
        assert!(err.to_string().contains("3 or 6"));
    }

    #[test]
    fn test_en_passant_valid_squares() {
        assert!(validate("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1").is_ok());
        assert!(validate("rnbqkbnr/pp1ppppp/8/2p5/8/8/PPPPPPPP/RNBQKBNR w KQkq c6 0 2").is_ok());
    }

    #[test]
    fn test_en_passant_malformed_square() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq z9 0 1"),
            Err(FenError::EnPassant("z9".into()))
        );
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq e36 0 1"),
            Err(FenError::EnPassant("e36".into()))
        );
    }

    #[test]
    fn test_negative_halfmove_clock() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - -1 1"),
            Err(FenError::HalfmoveClock("-1".into()))
        );
    }

    #[test]
    fn test_non_numeric_halfmove_clock() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - x 1"),
            Err(FenError::HalfmoveClock("x".into()))
        );
    }

    #[test]
    fn test_zero_fullmove_number() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 0"),
            Err(FenError::FullmoveNumber("0".into()))
        );
    }

    #[test]
    fn test_missing_white_king() {
        assert_eq!(
            validate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQ1BNR w KQkq - 0 1"),
            Err(FenError::KingCount {
                color: "white",
                count: 0
            })
        );
    }

    #[test]
    fn test_two_black_kings() {
        assert_eq!(
            validate("rnbqkbnk/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
            Err(FenError::KingCount {
                color: "black",
                count: 2
            })
        );
    }

    #[test]
    fn test_validation_errors_collects_multiple() {
        // Bad side to move, bad en passant, and a missing black king at once.
        let errors =
            validation_errors("rnbq1bnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq e5 0 1");
        assert!(errors.contains(&FenError::SideToMove("x".into())));
        assert!(errors.contains(&FenError::EnPassant("e5".into())));
        assert!(errors.contains(&FenError::KingCount {
            color: "black",
            count: 0
        }));
        assert!(errors.len() >= 3);
    }

    #[test]
    fn test_validation_errors_skips_absent_fields() {
        // Only the board field present: field count plus board-level errors,
        // but no side-to-move or counter errors for fields that don't exist.
        let errors = validation_errors("8/8/8/8/8/8/8/8");
        assert!(errors.contains(&FenError::FieldCount(1)));
        assert!(errors.contains(&FenError::KingCount {
            color: "white",
            count: 0
        }));
        assert!(!errors.iter().any(|e| matches!(e, FenError::SideToMove(_))));
    }

    #[test]
    fn test_is_valid_on_garbage_never_panics() {
        for junk in ["", " ", "/", "a b c d e f", "\u{1F600} w KQkq - 0 1"] {
            let _ = is_valid(junk);
        }
    }
}
