//! Database entities, one file per table.

pub mod badge;
pub mod game_session;
pub mod participant;
pub mod problem_instance;
pub mod problem_setting;
pub mod review_assignment;
pub mod review_vote;
pub mod solution;
pub mod solution_test_result;
pub mod student;
pub mod student_badge;
pub mod student_test;
pub mod test_case;

pub use badge::Entity as Badge;
pub use game_session::Entity as GameSession;
pub use participant::Entity as Participant;
pub use problem_instance::Entity as ProblemInstance;
pub use problem_setting::Entity as ProblemSetting;
pub use review_assignment::Entity as ReviewAssignment;
pub use review_vote::Entity as ReviewVote;
pub use solution::Entity as Solution;
pub use solution_test_result::Entity as SolutionTestResult;
pub use student::Entity as Student;
pub use student_badge::Entity as StudentBadge;
pub use student_test::Entity as StudentTest;
pub use test_case::Entity as TestCase;
