//! Standard chess via the `chess` crate.
//!
//! The `chess` crate tracks placement, castling rights and en passant but
//! not the halfmove clock or fullmove number, so those two FEN fields are
//! carried alongside the board here.

use std::str::FromStr;

use chess::{Board, BoardStatus, ChessMove, Color, File, MoveGen, Piece, Rank, Square};
use rookery_protocol::{MoveRecord, Side};

use crate::{
    AppliedMove, CandidateMove, DrawReason, PositionInfo, RulesEngine, RulesError, Terminal,
};

/// FEN of the standard starting position.
pub const START_POSITION: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Halfmove clock value at which the fifty-move rule draws the game.
const FIFTY_MOVE_PLIES: u32 = 100;

/// Rules engine for standard chess.
///
/// A missing promotion on a pawn reaching the last rank defaults to a
/// queen. Threefold repetition is not detected: it needs the position
/// history, and the engine only ever sees the current position.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChessRules;

impl ChessRules {
    pub fn new() -> Self {
        Self
    }
}

impl RulesEngine for ChessRules {
    fn start_position(&self) -> String {
        START_POSITION.to_string()
    }

    fn inspect(&self, position: &str) -> Result<PositionInfo, RulesError> {
        let parsed = Position::parse(position)?;
        Ok(parsed.info())
    }

    fn apply(&self, position: &str, candidate: &CandidateMove) -> Result<AppliedMove, RulesError> {
        let current = Position::parse(position)?;
        let board = &current.board;

        let from = parse_square(&candidate.from)?;
        let to = parse_square(&candidate.to)?;
        let moving = board.piece_on(from);

        let promotion = match candidate.promotion {
            Some(letter) => Some(parse_promotion(letter)?),
            None if moving == Some(Piece::Pawn) && is_last_rank(to) => Some(Piece::Queen),
            None => None,
        };
        let mv = ChessMove::new(from, to, promotion);
        let compact = mv.to_string();

        if !MoveGen::new_legal(board).any(|legal| legal == mv) {
            return Err(RulesError::IllegalMove(compact));
        }
        // Legal moves always start on an occupied square.
        let Some(piece) = moving else {
            return Err(RulesError::IllegalMove(compact));
        };

        let capture =
            board.piece_on(to).is_some() || (piece == Piece::Pawn && from.get_file() != to.get_file());
        let next = board.make_move_new(mv);
        let mover = board.side_to_move();

        let after = Position {
            board: next,
            halfmove: if piece == Piece::Pawn || capture {
                0
            } else {
                current.halfmove + 1
            },
            fullmove: if mover == Color::Black {
                current.fullmove + 1
            } else {
                current.fullmove
            },
        };

        let human = san(board, mv, piece, capture, &next);
        Ok(AppliedMove {
            record: MoveRecord { compact, human },
            mover: side(mover),
            position: after.render(),
            info: after.info(),
        })
    }
}

/// A parsed FEN: the board plus the two counters the board type drops.
struct Position {
    board: Board,
    halfmove: u32,
    fullmove: u32,
}

impl Position {
    fn parse(fen: &str) -> Result<Self, RulesError> {
        let board =
            Board::from_str(fen).map_err(|_| RulesError::InvalidPosition(fen.to_string()))?;
        let mut fields = fen.split_whitespace().skip(4);
        let halfmove = parse_counter(fields.next(), 0, fen)?;
        let fullmove = parse_counter(fields.next(), 1, fen)?;
        Ok(Self {
            board,
            halfmove,
            fullmove,
        })
    }

    fn render(&self) -> String {
        let fen = self.board.to_string();
        let head: Vec<&str> = fen.split_whitespace().take(4).collect();
        format!("{} {} {}", head.join(" "), self.halfmove, self.fullmove)
    }

    fn info(&self) -> PositionInfo {
        let terminal = match self.board.status() {
            BoardStatus::Checkmate => Some(Terminal::Checkmate),
            BoardStatus::Stalemate => Some(Terminal::Stalemate),
            BoardStatus::Ongoing if insufficient_material(&self.board) => {
                Some(Terminal::Draw(DrawReason::InsufficientMaterial))
            }
            BoardStatus::Ongoing if self.halfmove >= FIFTY_MOVE_PLIES => {
                Some(Terminal::Draw(DrawReason::FiftyMoveRule))
            }
            BoardStatus::Ongoing => None,
        };
        PositionInfo {
            side_to_move: side(self.board.side_to_move()),
            in_check: self.board.checkers().popcnt() > 0,
            terminal,
        }
    }
}

fn parse_counter(field: Option<&str>, default: u32, fen: &str) -> Result<u32, RulesError> {
    match field {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| RulesError::InvalidPosition(fen.to_string())),
    }
}

fn parse_square(raw: &str) -> Result<Square, RulesError> {
    let bytes = raw.as_bytes();
    let malformed = || RulesError::MalformedMove(format!("bad square {raw:?}"));
    if bytes.len() != 2 {
        return Err(malformed());
    }
    let file = bytes[0].to_ascii_lowercase();
    let rank = bytes[1];
    if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
        return Err(malformed());
    }
    Ok(Square::make_square(
        Rank::from_index(usize::from(rank - b'1')),
        File::from_index(usize::from(file - b'a')),
    ))
}

fn parse_promotion(letter: char) -> Result<Piece, RulesError> {
    match letter.to_ascii_lowercase() {
        'q' => Ok(Piece::Queen),
        'r' => Ok(Piece::Rook),
        'b' => Ok(Piece::Bishop),
        'n' => Ok(Piece::Knight),
        other => Err(RulesError::MalformedMove(format!(
            "bad promotion piece {other:?}"
        ))),
    }
}

fn is_last_rank(square: Square) -> bool {
    matches!(square.get_rank(), Rank::First | Rank::Eighth)
}

fn side(color: Color) -> Side {
    match color {
        Color::White => Side::White,
        Color::Black => Side::Black,
    }
}

fn piece_letter(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'P',
        Piece::Knight => 'N',
        Piece::Bishop => 'B',
        Piece::Rook => 'R',
        Piece::Queen => 'Q',
        Piece::King => 'K',
    }
}

fn file_char(square: Square) -> char {
    char::from(b'a' + square.get_file().to_index() as u8)
}

fn rank_char(square: Square) -> char {
    char::from(b'1' + square.get_rank().to_index() as u8)
}

/// Standard algebraic notation for a legal move on `board`.
fn san(board: &Board, mv: ChessMove, piece: Piece, capture: bool, next: &Board) -> String {
    let from = mv.get_source();
    let to = mv.get_dest();
    let mut out = String::new();

    let file_delta = from.get_file().to_index().abs_diff(to.get_file().to_index());
    if piece == Piece::King && file_delta == 2 {
        out.push_str(if to.get_file().to_index() > from.get_file().to_index() {
            "O-O"
        } else {
            "O-O-O"
        });
    } else {
        if piece == Piece::Pawn {
            if capture {
                out.push(file_char(from));
            }
        } else {
            out.push(piece_letter(piece));
            let rivals: Vec<Square> = MoveGen::new_legal(board)
                .filter(|m| {
                    m.get_dest() == to
                        && m.get_source() != from
                        && board.piece_on(m.get_source()) == Some(piece)
                })
                .map(|m| m.get_source())
                .collect();
            if !rivals.is_empty() {
                let shares_file = rivals.iter().any(|s| s.get_file() == from.get_file());
                let shares_rank = rivals.iter().any(|s| s.get_rank() == from.get_rank());
                if !shares_file {
                    out.push(file_char(from));
                } else if !shares_rank {
                    out.push(rank_char(from));
                } else {
                    out.push(file_char(from));
                    out.push(rank_char(from));
                }
            }
        }
        if capture {
            out.push('x');
        }
        out.push_str(&to.to_string());
        if let Some(promoted) = mv.get_promotion() {
            out.push('=');
            out.push(piece_letter(promoted));
        }
    }

    match next.status() {
        BoardStatus::Checkmate => out.push('#'),
        _ if next.checkers().popcnt() > 0 => out.push('+'),
        _ => {}
    }
    out
}

/// Neither side can mate: bare kings, a single minor piece, or only
/// bishops that all stand on one square colour.
fn insufficient_material(board: &Board) -> bool {
    let heavy = *board.pieces(Piece::Pawn) | *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);
    if heavy.popcnt() > 0 {
        return false;
    }
    let knights = board.pieces(Piece::Knight).popcnt();
    let bishops = *board.pieces(Piece::Bishop);
    if knights + bishops.popcnt() <= 1 {
        return true;
    }
    if knights > 0 {
        return false;
    }
    let mut colours = bishops.map(|sq| (sq.get_file().to_index() + sq.get_rank().to_index()) % 2);
    match colours.next() {
        Some(first) => colours.all(|c| c == first),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(position: &str, compact: &str) -> AppliedMove {
        let candidate = CandidateMove::parse_compact(compact).unwrap();
        ChessRules.apply(position, &candidate).unwrap()
    }

    fn play_line(moves: &[&str]) -> AppliedMove {
        let mut position = START_POSITION.to_string();
        let mut last = None;
        for compact in moves {
            let applied = play(&position, compact);
            position = applied.position.clone();
            last = Some(applied);
        }
        last.unwrap()
    }

    #[test]
    fn test_inspect_start_position_white_to_move() {
        let info = ChessRules.inspect(START_POSITION).unwrap();
        assert_eq!(info.side_to_move, Side::White);
        assert!(!info.in_check);
        assert_eq!(info.terminal, None);
    }

    #[test]
    fn test_inspect_garbage_is_invalid_position() {
        assert!(matches!(
            ChessRules.inspect("not a fen"),
            Err(RulesError::InvalidPosition(_))
        ));
    }

    #[test]
    fn test_apply_pawn_push_updates_position_and_counters() {
        let applied = play(START_POSITION, "e2e4");
        assert_eq!(applied.record.compact, "e2e4");
        assert_eq!(applied.record.human, "e4");
        assert_eq!(applied.mover, Side::White);
        assert!(
            applied
                .position
                .starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq")
        );
        assert!(applied.position.ends_with(" 0 1"));
        assert_eq!(applied.info.side_to_move, Side::Black);
    }

    #[test]
    fn test_apply_counters_follow_fen_rules() {
        let after_black = play_line(&["e2e4", "e7e5"]);
        assert!(after_black.position.ends_with(" 0 2"));

        let knight = play(&after_black.position, "g1f3");
        assert_eq!(knight.record.human, "Nf3");
        assert!(knight.position.ends_with(" 1 2"));
    }

    #[test]
    fn test_apply_illegal_move_rejected() {
        let err = ChessRules
            .apply(START_POSITION, &CandidateMove::new("e2", "e5", None))
            .unwrap_err();
        assert_eq!(err, RulesError::IllegalMove("e2e5".into()));
    }

    #[test]
    fn test_apply_bad_square_and_promotion_are_malformed() {
        let bad_square = ChessRules.apply(START_POSITION, &CandidateMove::new("z9", "e4", None));
        assert!(matches!(bad_square, Err(RulesError::MalformedMove(_))));

        let bad_promo =
            ChessRules.apply(START_POSITION, &CandidateMove::new("e2", "e4", Some('k')));
        assert!(matches!(bad_promo, Err(RulesError::MalformedMove(_))));
    }

    #[test]
    fn test_apply_fools_mate_is_checkmate() {
        let mate = play_line(&["f2f3", "e7e5", "g2g4", "d8h4"]);
        assert_eq!(mate.record.human, "Qh4#");
        assert_eq!(mate.mover, Side::Black);
        assert_eq!(mate.info.terminal, Some(Terminal::Checkmate));
        assert!(mate.info.in_check);
        assert_eq!(mate.info.side_to_move, Side::White);
    }

    #[test]
    fn test_apply_castling_notation() {
        let fen = "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1";
        assert_eq!(play(fen, "e1g1").record.human, "O-O");
        assert_eq!(play(fen, "e1c1").record.human, "O-O-O");
    }

    #[test]
    fn test_apply_disambiguates_by_file_then_rank() {
        let knights = "4k3/8/8/8/8/8/8/1N2KN2 w - - 0 1";
        assert_eq!(play(knights, "b1d2").record.human, "Nbd2");

        let rooks = "4k3/8/8/R7/8/8/8/R3K3 w - - 0 1";
        assert_eq!(play(rooks, "a1a3").record.human, "R1a3");
    }

    #[test]
    fn test_apply_missing_promotion_defaults_to_queen() {
        let applied = play("4k3/P7/8/8/8/8/8/4K3 w - - 0 1", "a7a8");
        assert_eq!(applied.record.compact, "a7a8q");
        assert_eq!(applied.record.human, "a8=Q+");
        assert!(applied.info.in_check);
    }

    #[test]
    fn test_apply_underpromotion_kept() {
        let applied = play("4k3/P7/8/8/8/8/8/4K3 w - - 0 1", "a7a8n");
        assert_eq!(applied.record.human, "a8=N");
    }

    #[test]
    fn test_apply_stalemate_detected() {
        let applied = play("k7/8/1K6/8/8/8/2Q5/8 w - - 0 1", "c2c7");
        assert_eq!(applied.info.terminal, Some(Terminal::Stalemate));
        assert!(!applied.info.in_check);
    }

    #[test]
    fn test_apply_bare_kings_is_insufficient_material() {
        let applied = play("4k3/8/8/8/8/8/3p4/4K3 w - - 0 1", "e1d2");
        assert_eq!(applied.record.human, "Kxd2");
        assert_eq!(
            applied.info.terminal,
            Some(Terminal::Draw(DrawReason::InsufficientMaterial))
        );
    }

    #[test]
    fn test_apply_hundredth_quiet_ply_is_fifty_move_draw() {
        let applied = play("4k3/8/8/8/8/8/8/R3K3 w - - 99 60", "a1a2");
        assert!(applied.position.ends_with(" 100 60"));
        assert_eq!(
            applied.info.terminal,
            Some(Terminal::Draw(DrawReason::FiftyMoveRule))
        );
    }
}
