/// End-to-end grading tests against real language runtimes
///
/// These tests run full submissions through the process sandbox:
/// 1. Interpreted languages return values through the output slot
/// 2. User prints never leak into the graded value
/// 3. Runtime errors and infinite loops become faults, not panics
/// 4. Compiled languages report compiler diagnostics
/// 5. Solution-class and free-function conventions both resolve

#[cfg(test)]
mod end_to_end_tests {
    use crate::config::LanguageConfigManager;
    use crate::entry_point::EntryPointRegistry;
    use crate::grader::Grader;
    use crate::harness::HarnessBuilder;
    use crate::sandbox::ProcessSandbox;
    use arbiter_common::config::GraderConfig;
    use arbiter_common::types::{Fault, Submission, SubmissionStatus, TestCase};

    fn grader(timeout_ms: u64) -> Grader<ProcessSandbox> {
        let config = GraderConfig {
            timeout_ms,
            worker_slots: 2,
            max_concurrent_submissions: 2,
            ..GraderConfig::default()
        };
        let harness = HarnessBuilder::new(LanguageConfigManager::builtin(), EntryPointRegistry::default());
        Grader::new(harness, ProcessSandbox::new(), &config)
    }

    fn submission(language: &str, source: &str, cases: &[(&str, &str)]) -> Submission {
        Submission {
            source_code: source.to_string(),
            language: language.to_string(),
            test_cases: cases.iter().map(|(i, o)| TestCase::new(*i, *o)).collect(),
        }
    }

    const TWO_SUM_CASES: &[(&str, &str)] = &[
        ("[2,7,11,15],9", "[0,1]"),
        ("[3,2,4],6", "[1,2]"),
        ("[3,3],6", "[0,1]"),
    ];

    #[tokio::test]
    #[ignore] // Requires node
    async fn test_javascript_two_sum_accepted() {
        let source = r#"
var twoSum = function(nums, target) {
    const seen = new Map();
    for (let i = 0; i < nums.length; i++) {
        console.log("checking", i);
        if (seen.has(target - nums[i])) return [seen.get(target - nums[i]), i];
        seen.set(nums[i], i);
    }
    return [];
};
"#;
        let verdict = grader(5000)
            .grade(&submission("javascript", source, TWO_SUM_CASES))
            .await
            .expect("grading should succeed");

        assert_eq!(verdict.overall_status, SubmissionStatus::Accepted);
        assert_eq!(verdict.passed_count(), 3);
        assert_eq!(verdict.case_results[1].formatted_output, "[1,2]");
    }

    #[tokio::test]
    #[ignore] // Requires node
    async fn test_javascript_infinite_loop_times_out() {
        let source = "function twoSum(nums, target) { while (true) {} }";
        let verdict = grader(500)
            .grade(&submission("javascript", source, &TWO_SUM_CASES[..1]))
            .await
            .expect("grading should succeed");

        assert_eq!(verdict.overall_status, SubmissionStatus::TimeLimitExceeded);
        assert_eq!(verdict.case_results[0].fault, Some(Fault::Timeout));
        assert_eq!(verdict.case_results[0].elapsed_millis, 500);
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_solution_class_and_runtime_error() {
        let source = r#"
class Solution:
    def lengthOfLongestSubstring(self, s: str) -> int:
        if s == "boom":
            raise ValueError("bad input")
        print("debug output")
        best, start, seen = 0, 0, {}
        for i, c in enumerate(s):
            if c in seen and seen[c] >= start:
                start = seen[c] + 1
            seen[c] = i
            best = max(best, i - start + 1)
        return best
"#;
        let verdict = grader(5000)
            .grade(&submission(
                "python",
                source,
                &[("\"abcabcbb\"", "3"), ("\"boom\"", "0")],
            ))
            .await
            .expect("grading should succeed");

        assert!(verdict.case_results[0].passed);
        assert_eq!(verdict.overall_status, SubmissionStatus::RuntimeError);
        match &verdict.case_results[1].fault {
            Some(Fault::RuntimeError(message)) => assert!(message.contains("ValueError")),
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_wrong_answer() {
        let source = "def isPalindrome(s):\n    return True\n";
        let verdict = grader(5000)
            .grade(&submission(
                "python",
                source,
                &[("\"A man, a plan, a canal: Panama\"", "true"), ("\"race a car\"", "false")],
            ))
            .await
            .expect("grading should succeed");

        assert_eq!(verdict.overall_status, SubmissionStatus::WrongAnswer);
        assert_eq!(verdict.case_results[1].formatted_output, "true");
    }

    #[tokio::test]
    #[ignore] // Requires a JDK
    async fn test_java_two_sum_accepted() {
        let source = r#"
class Solution {
    public int[] twoSum(int[] nums, int target) {
        Map<Integer, Integer> seen = new HashMap<>();
        for (int i = 0; i < nums.length; i++) {
            System.out.println("noise");
            Integer j = seen.get(target - nums[i]);
            if (j != null) return new int[]{j, i};
            seen.put(nums[i], i);
        }
        return new int[0];
    }
}
"#;
        let verdict = grader(10_000)
            .grade(&submission("java", source, TWO_SUM_CASES))
            .await
            .expect("grading should succeed");

        assert_eq!(verdict.overall_status, SubmissionStatus::Accepted);
    }

    #[tokio::test]
    #[ignore] // Requires a JDK
    async fn test_java_compile_error_reported() {
        let source = "class Solution { public int[] twoSum(int[] nums, int target) { return nums }";
        let verdict = grader(10_000)
            .grade(&submission("java", source, &TWO_SUM_CASES[..1]))
            .await
            .expect("grading should succeed");

        assert_eq!(verdict.overall_status, SubmissionStatus::CompilationError);
        assert_eq!(verdict.case_results[0].elapsed_millis, 0);
    }

    #[tokio::test]
    #[ignore] // Requires g++
    async fn test_cpp_free_function_accepted() {
        let source = r#"
int longestValidParentheses(string s) {
    int best = 0;
    vector<int> stack = {-1};
    for (int i = 0; i < (int)s.size(); i++) {
        if (s[i] == '(') { stack.push_back(i); continue; }
        stack.pop_back();
        if (stack.empty()) stack.push_back(i);
        else best = max(best, i - stack.back());
    }
    cout << "ignored" << endl;
    return best;
}
"#;
        let verdict = grader(10_000)
            .grade(&submission(
                "cpp",
                source,
                &[("\"(()\"", "2"), ("\")()())\"", "4"), ("\"\"", "0")],
            ))
            .await
            .expect("grading should succeed");

        assert_eq!(verdict.overall_status, SubmissionStatus::Accepted);
    }

    #[tokio::test]
    #[ignore] // Requires g++
    async fn test_cpp_uncaught_exception_is_runtime_error() {
        let source = r#"
class Solution {
public:
    bool isPalindrome(string s) {
        return s.at(100) == s.at(0);
    }
};
"#;
        let verdict = grader(10_000)
            .grade(&submission("cpp", source, &[("\"racecar\"", "true")]))
            .await
            .expect("grading should succeed");

        assert_eq!(verdict.overall_status, SubmissionStatus::RuntimeError);
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_python_non_finite_return_is_null() {
        let source = "def isPalindrome(s):\n    return [float('nan'), float('inf'), 1.5]\n";
        let verdict = grader(5000)
            .grade(&submission("python", source, &[("\"abba\"", "[null,null,1.5]")]))
            .await
            .expect("grading should succeed");

        assert_eq!(verdict.case_results[0].fault, None);
        assert_eq!(verdict.overall_status, SubmissionStatus::Accepted);
    }

    #[tokio::test]
    #[ignore] // Requires a JDK
    async fn test_java_void_method_returns_null() {
        let source = "class Solution {\n    public void isPalindrome(String s) {\n        System.out.println(s);\n    }\n}\n";
        let verdict = grader(10_000)
            .grade(&submission("java", source, &[("\"abba\"", "null")]))
            .await
            .expect("grading should succeed");

        assert_eq!(verdict.overall_status, SubmissionStatus::Accepted);
        assert_eq!(verdict.case_results[0].formatted_output, "null");
    }

    #[tokio::test]
    #[ignore] // Requires g++
    async fn test_cpp_void_function_returns_null() {
        let source = "void isPalindrome(string s) {\n    cout << s << endl;\n}\n";
        let verdict = grader(10_000)
            .grade(&submission("cpp", source, &[("\"abba\"", "null")]))
            .await
            .expect("grading should succeed");

        assert_eq!(verdict.overall_status, SubmissionStatus::Accepted);
    }

    #[tokio::test]
    #[ignore] // Requires g++
    async fn test_cpp_printf_flood_does_not_hide_result() {
        let source = r#"
bool isPalindrome(string s) {
    for (int i = 0; i < 200000; i++) {
        printf("debug line %d\n", i);
        puts("more debug");
    }
    return true;
}
"#;
        let verdict = grader(10_000)
            .grade(&submission("cpp", source, &[("\"abba\"", "true")]))
            .await
            .expect("grading should succeed");

        assert_eq!(verdict.case_results[0].fault, None);
        assert_eq!(verdict.overall_status, SubmissionStatus::Accepted);
    }
}
