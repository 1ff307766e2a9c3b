//! Seed data: a minimal built-in Python track so the engine is useful without a config file.

use crate::domain::{Activity, Question};

fn q(id: &str, prompt: &str, function_name: &str, test_count: u32) -> Question {
  Question { id: id.into(), prompt: prompt.into(), function_name: function_name.into(), test_count }
}

pub fn seed_activities() -> Vec<Activity> {
  vec![
    Activity {
      language: "Python".into(),
      title: "First Functions".into(),
      order: 1,
      description: "Write small functions that return values.".into(),
      questions: vec![
        q("ff-add", "Return the sum of a and b.", "add", 3),
        q("ff-double", "Return n multiplied by two.", "double", 3),
        q("ff-greet", "Return \"Hello, <name>!\" for the given name.", "greet", 3),
        q("ff-is-even", "Return True when n is even.", "is_even", 4),
        q("ff-max2", "Return the larger of a and b.", "max_of_two", 3),
        q("ff-abs", "Return the absolute value of n without using abs().", "absolute", 4),
      ],
    },
    Activity {
      language: "Python".into(),
      title: "Loops and Lists".into(),
      order: 2,
      description: "Walk through lists with for loops.".into(),
      questions: vec![
        q("ll-total", "Return the sum of all numbers in the list.", "total", 3),
        q("ll-count", "Count how many times x appears in the list.", "count_of", 3),
        q("ll-reverse", "Return the list in reverse order.", "reverse_list", 3),
        q("ll-evens", "Return only the even numbers, keeping their order.", "only_evens", 4),
        q("ll-longest", "Return the longest word in the list.", "longest_word", 3),
        q("ll-fizz", "Return the FizzBuzz strings from 1 to n.", "fizzbuzz", 5),
      ],
    },
  ]
}
